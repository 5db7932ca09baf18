//! The interactive session boundary and the engine command strings.
//!
//! The engine has no correlation ids: command/response pairs must stay
//! strictly synchronous and ordered, so a session is driven one command
//! sequence at a time. Batch execution is an optimization only; the outputs
//! come back in command order in a single blocking round trip.

use crate::Result;

use anyhow::{Context, bail};
use std::collections::BTreeMap;
use std::fs;

/// A long-lived interactive engine process. Transport errors are surfaced
/// verbatim; the core never interprets them.
pub trait Session {
    /// Execute one command and return its raw textual output.
    fn execute_command(&mut self, command: &str) -> Result<String>;

    /// Execute several commands; the outputs are returned in the same order.
    fn execute_batch(&mut self, commands: &[String]) -> Result<Vec<String>> {
        commands
            .iter()
            .map(|cmd| self.execute_command(cmd))
            .collect()
    }
}

/// A deterministic [`Session`] backed by a recorded command -> output map.
///
/// Used to replay captured engine sessions (and to drive tests). A command
/// without a recorded output is a transport error.
#[derive(Debug, Clone)]
pub struct ReplaySession {
    outputs: BTreeMap<String, String>,
}

impl ReplaySession {
    pub fn new(outputs: BTreeMap<String, String>) -> Self {
        Self { outputs }
    }

    /// Load a transcript file: a JSON object mapping command strings to
    /// their recorded outputs.
    pub fn from_file(path: &str) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read transcript file {}", path))?;
        let outputs: BTreeMap<String, String> =
            serde_json::from_str(&text).with_context(|| format!("parse transcript {}", path))?;
        Ok(Self { outputs })
    }
}

impl Session for ReplaySession {
    fn execute_command(&mut self, command: &str) -> Result<String> {
        match self.outputs.get(command) {
            Some(output) => Ok(output.clone()),
            None => bail!("no recorded output for command {:?}", command),
        }
    }
}

/// Command printing the workspace-wide summary listing (heading groups).
pub fn summary_command(workspace_name: &str) -> String {
    format!("{}.Print();", workspace_name)
}

/// Command printing the verbose diagnostic dump of one member.
pub fn verbose_print_command(workspace_name: &str, var_name: &str) -> String {
    format!("{}->obj(\"{}\")->Print(\"V\");", workspace_name, var_name)
}

/// Macro emitting, for every workspace component, one comma-separated
/// record: class name, six inheritance flags and the component name.
pub fn type_flag_summary_command(workspace_name: &str) -> String {
    format!(
        "{{TIterator *it = {ws}->componentIterator(); \
         TObject *obj; \
         while ((obj = it->Next()) != NULL) \
         {{ cout \
         << obj->ClassName() << \",\" \
         << obj->IsA()->InheritsFrom(RooAbsPdf::Class()) << \",\" \
         << obj->IsA()->InheritsFrom(RooConstVar::Class()) << \",\" \
         << obj->IsA()->InheritsFrom(RooRealVar::Class()) << \",\" \
         << obj->IsA()->InheritsFrom(RooAbsData::Class()) << \",\" \
         << obj->IsA()->InheritsFrom(RooAbsReal::Class()) << \",\" \
         << obj->IsA()->InheritsFrom(RooAbsCategory::Class()) << \",\" \
         << obj->GetName() \
         << endl; }} }}",
        ws = workspace_name
    )
}

/// Targeted query for the current value and constness of a real variable.
pub fn value_query_command(workspace_name: &str, var_name: &str) -> String {
    format!(
        "{{ RooRealVar *obj = {ws}->var(\"{var}\"); \
         cout << obj->getVal() << \",\" << obj->isConstant() << endl; }}",
        ws = workspace_name,
        var = var_name
    )
}

/// Command updating the value of a real variable inside the engine session.
pub fn set_value_command(workspace_name: &str, var_name: &str, value: f64) -> String {
    format!(
        "{{ RooRealVar *xvar = {ws}->var(\"{var}\");\n  xvar->setVal({value});\n}}\n",
        ws = workspace_name,
        var = var_name,
        value = value
    )
}
