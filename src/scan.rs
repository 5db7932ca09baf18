//! Workspace discovery: drive an engine session, enumerate the components
//! and build a finalized [`Workspace`].
//!
//! Two discovery strategies exist. The heading-grouped summary is what the
//! engine prints by default; it is human-oriented and omits constants. The
//! type-flag strategy runs an iterator macro inside the session and gets a
//! machine-readable line per component, including inheritance flags. Both
//! end with the same backfill and finalize steps.

use crate::Result;
use crate::dispatch::ModificationDispatcher;
use crate::member::{CONST_VAR_CLASS, KindHint, Member};
use crate::session::{
    Session, set_value_command, summary_command, type_flag_summary_command, value_query_command,
    verbose_print_command,
};
use crate::workspace::{ResolutionMode, Workspace};

use anyhow::{Context, anyhow, bail};
use clap::ValueEnum;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Which summary listing drives the component enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScanStrategy {
    /// Parse the heading-grouped textual summary.
    Headings,
    /// Run an iterator macro reporting class and inheritance flags.
    TypeFlags,
}

/// A member whose verbose dump could not be parsed. Carries the full dump
/// so the failure can be diagnosed without re-running the session.
#[derive(Debug, Error)]
#[error("failed to parse the dump of member '{var_name}': {message}")]
pub struct MemberParseError {
    pub var_name: String,
    pub raw_output: String,
    pub message: String,
}

impl MemberParseError {
    /// The short message plus the offending dump text.
    pub fn verbose_message(&self) -> String {
        format!("{}\noffending output:\n{}", self, self.raw_output)
    }
}

/// Reads one workspace end to end: enumerate the components, fetch and
/// parse every verbose dump, backfill constants the summary omitted and
/// finalize the dependency graph.
pub fn read_workspace<S: Session>(
    session: &mut S,
    source: &str,
    workspace_name: &str,
    mode: ResolutionMode,
    strategy: ScanStrategy,
) -> Result<Workspace> {
    let mut ws = match strategy {
        ScanStrategy::Headings => scan_headings(session, source, workspace_name, mode)?,
        ScanStrategy::TypeFlags => scan_type_flags(session, source, workspace_name, mode)?,
    };
    backfill_const_vars(session, &mut ws, workspace_name)?;
    ws.finalize()?;
    info!(
        workspace = %ws.name(),
        members = ws.len(),
        "workspace read and finalized"
    );
    Ok(ws)
}

/// Fetches the verbose dump of one component and registers it.
fn register_member<S: Session>(
    session: &mut S,
    ws: &mut Workspace,
    workspace_name: &str,
    var_name: &str,
    class_name: &str,
    hint: KindHint,
) -> Result<usize> {
    let raw = session.execute_command(&verbose_print_command(workspace_name, var_name))?;
    register_from_output(ws, var_name, class_name, hint, &raw)
}

fn register_from_output(
    ws: &mut Workspace,
    var_name: &str,
    class_name: &str,
    hint: KindHint,
    raw_output: &str,
) -> Result<usize> {
    match Member::from_dump(var_name, class_name, hint, raw_output) {
        Ok(member) => ws.register(member),
        Err(err) => Err(MemberParseError {
            var_name: var_name.to_string(),
            raw_output: raw_output.to_string(),
            message: format!("{:#}", err),
        }
        .into()),
    }
}

// e.g.  [#1] ERROR:InputArguments -- ...
const ERROR_LINE_RE: &str = r"^\[#\d+\] ERROR:";
// e.g.  RooGaussian::gaussian[ x=mrec mean=mean sigma=s ] = 0.5
const COMPONENT_RE: &str = r"^(.*)::([a-zA-Z0-9_]*)\[";
// e.g.  RooDataSet::data.set(mrec)   (the name runs up to the first paren)
const DATASET_RE: &str = r"^(.*?)::([^(]*)\(";

/// Parses the heading-grouped summary. The listing begins at the title
/// line naming the requested workspace; everything before it (command
/// echo, engine banner) is session chatter and is skipped. Groups are
/// separated by blank lines; the first line of a group is its heading. An
/// unrecognized heading is fatal: it means components of an unknown
/// category would be silently dropped.
fn scan_headings<S: Session>(
    session: &mut S,
    source: &str,
    workspace_name: &str,
    mode: ResolutionMode,
) -> Result<Workspace> {
    let output = session.execute_command(&summary_command(workspace_name))?;

    let error_re = Regex::new(ERROR_LINE_RE)?;
    // e.g.  RooWorkspace(wspace) wspace contents
    let title_re = Regex::new(&format!(
        r"^RooWorkspace\({}\)\s+.*\s+contents$",
        regex::escape(workspace_name)
    ))?;

    // Engine error chatter can land anywhere in the listing, including in
    // the middle of a group. Strip it before grouping.
    let mut seen_title = false;
    let mut lines: Vec<&str> = Vec::new();
    for line in output.lines() {
        if !seen_title {
            seen_title = title_re.is_match(line.trim_end());
            continue;
        }
        if error_re.is_match(line) {
            debug!(line, "skipping engine error line in summary");
            continue;
        }
        lines.push(line);
    }
    if !seen_title {
        bail!(
            "could not find the title line for workspace '{}' in the summary output",
            workspace_name
        );
    }

    let mut ws = Workspace::new(source, workspace_name, mode);

    let mut groups: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    for group in groups {
        let heading = group[0].trim();
        // the heading is underlined with dashes
        let body: Vec<&str> = group[1..]
            .iter()
            .copied()
            .filter(|line| !line.trim().chars().all(|c| c == '-'))
            .collect();

        match heading {
            "variables" => scan_variable_group(session, &mut ws, workspace_name, &body)?,
            "p.d.f.s" => {
                scan_component_group(session, &mut ws, workspace_name, &body, KindHint::Pdf)?
            }
            "functions" => {
                scan_component_group(session, &mut ws, workspace_name, &body, KindHint::Function)?
            }
            "datasets" => scan_dataset_group(session, &mut ws, workspace_name, &body)?,
            other => bail!("unknown heading {:?} in the workspace summary", other),
        }
    }

    Ok(ws)
}

/// The variables group is a parenthesized comma-separated name list,
/// possibly wrapped over several lines.
fn scan_variable_group<S: Session>(
    session: &mut S,
    ws: &mut Workspace,
    workspace_name: &str,
    body: &[&str],
) -> Result<()> {
    let mut combined = String::new();
    for line in body {
        combined.push_str(line.trim());
    }
    let inner = combined
        .trim_start_matches('(')
        .trim_end_matches(')')
        .to_string();

    for name in inner.split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        register_member(session, ws, workspace_name, name, "RooRealVar", KindHint::Variable)?;
    }
    Ok(())
}

/// P.d.f.s and functions are listed one per line as `Class::name[...]`.
/// The dumps are fetched in one batch round trip.
fn scan_component_group<S: Session>(
    session: &mut S,
    ws: &mut Workspace,
    workspace_name: &str,
    body: &[&str],
    hint: KindHint,
) -> Result<()> {
    let re = Regex::new(COMPONENT_RE)?;

    let mut found: Vec<(String, String)> = Vec::new();
    for line in body {
        let Some(caps) = re.captures(line.trim()) else {
            bail!("cannot parse component line {:?}", line);
        };
        found.push((
            caps.get(1).unwrap().as_str().to_string(),
            caps.get(2).unwrap().as_str().to_string(),
        ));
    }

    let commands: Vec<String> = found
        .iter()
        .map(|(_, name)| verbose_print_command(workspace_name, name))
        .collect();
    let outputs = session.execute_batch(&commands)?;
    if outputs.len() != commands.len() {
        bail!(
            "batch returned {} outputs for {} commands",
            outputs.len(),
            commands.len()
        );
    }

    for ((class_name, name), raw) in found.iter().zip(&outputs) {
        register_from_output(ws, name, class_name, hint, raw)?;
    }
    Ok(())
}

/// Datasets are listed as `Class::name(observables)`. Dataset names may
/// contain dots, so the name runs up to the first paren.
fn scan_dataset_group<S: Session>(
    session: &mut S,
    ws: &mut Workspace,
    workspace_name: &str,
    body: &[&str],
) -> Result<()> {
    let re = Regex::new(DATASET_RE)?;
    for line in body {
        let Some(caps) = re.captures(line.trim()) else {
            bail!("cannot parse dataset line {:?}", line);
        };
        let class_name = caps.get(1).unwrap().as_str();
        let name = caps.get(2).unwrap().as_str();
        register_member(session, ws, workspace_name, name, class_name, KindHint::Dataset)?;
    }
    Ok(())
}

fn parse_flag(field: &str) -> Result<bool> {
    let value: i64 = field
        .trim()
        .parse()
        .with_context(|| format!("bad inheritance flag {:?}", field))?;
    Ok(value != 0)
}

/// Parses the iterator-macro output: one record per component with the
/// class name, six inheritance flags and the component name. Names may
/// contain commas, so only the first seven fields are split off.
fn scan_type_flags<S: Session>(
    session: &mut S,
    source: &str,
    workspace_name: &str,
    mode: ResolutionMode,
) -> Result<Workspace> {
    let output = session.execute_command(&type_flag_summary_command(workspace_name))?;
    let mut ws = Workspace::new(source, workspace_name, mode);

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.splitn(8, ',').collect();
        if fields.len() != 8 {
            bail!("cannot parse component type line {:?}", line);
        }
        let class_name = fields[0].trim();
        let is_pdf = parse_flag(fields[1])?;
        let is_const_var = parse_flag(fields[2])?;
        let is_real_var = parse_flag(fields[3])?;
        let is_abs_data = parse_flag(fields[4])?;
        let is_abs_real = parse_flag(fields[5])?;
        let is_category = parse_flag(fields[6])?;
        let name = fields[7].trim();

        // Most specific flag wins: every constant is also a real-valued
        // object, every p.d.f. is also a function.
        let hint = if is_const_var {
            KindHint::ConstVar
        } else if is_pdf {
            KindHint::Pdf
        } else if is_real_var {
            KindHint::Variable
        } else if is_abs_data {
            KindHint::Dataset
        } else if is_abs_real {
            KindHint::Function
        } else if is_category {
            KindHint::Category
        } else {
            warn!(name, class_name, "skipping component with no recognized type flag");
            continue;
        };

        let id = register_member(session, &mut ws, workspace_name, name, class_name, hint)?;
        if hint == KindHint::Variable {
            let out = session.execute_command(&value_query_command(workspace_name, name))?;
            let (value, is_constant) = parse_value_output(&out)?;
            ws.update_real_var(id, Some(value), Some(is_constant))?;
        }
    }

    Ok(ws)
}

/// Parses a `value,constness` line from a targeted value query.
fn parse_value_output(output: &str) -> Result<(f64, bool)> {
    let line = output
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| anyhow!("empty output from value query"))?
        .trim();

    let mut parts = line.splitn(2, ',');
    let value: f64 = parts
        .next()
        .unwrap()
        .trim()
        .parse()
        .with_context(|| format!("bad value in {:?}", line))?;
    let constant = parse_flag(
        parts
            .next()
            .ok_or_else(|| anyhow!("missing constness flag in {:?}", line))?,
    )?;
    Ok((value, constant))
}

/// Constants never appear in the summary listings but do appear as
/// servers of other members. Fetch every such reference that resolution
/// would otherwise fail on.
fn backfill_const_vars<S: Session>(
    session: &mut S,
    ws: &mut Workspace,
    workspace_name: &str,
) -> Result<()> {
    let mut candidates = Vec::new();
    for member in ws.members() {
        for record in member.server_records() {
            if record.class_name == CONST_VAR_CLASS {
                candidates.push(record.clone());
            }
        }
    }

    for record in candidates {
        let present = match ws.mode() {
            ResolutionMode::ByAddress => ws.find_by_address(&record.address).is_some(),
            ResolutionMode::ByName => ws.find_by_name(&record.var_name).is_some(),
        };
        if present {
            continue;
        }
        info!(name = %record.var_name, "fetching constant missing from the summary");
        register_member(
            session,
            ws,
            workspace_name,
            &record.var_name,
            &record.class_name,
            KindHint::ConstVar,
        )?;
    }
    Ok(())
}

/// Pushes a new variable value into the live engine session, mirrors it in
/// the local model and notifies everything that depends on the variable.
pub fn push_value_update<S: Session>(
    session: &mut S,
    ws: &mut Workspace,
    dispatcher: &ModificationDispatcher,
    workspace_name: &str,
    member_id: usize,
    value: f64,
) -> Result<()> {
    let var_name = ws.member(member_id).var_name.clone();
    session.execute_command(&set_value_command(workspace_name, &var_name, value))?;
    ws.update_real_var(member_id, Some(value), None)?;
    dispatcher.notify_modified(ws, member_id, true)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MemberKind;
    use crate::member::fixtures::dump_text;
    use crate::session::ReplaySession;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    const SUMMARY: &str = "\
root [0] wspace.Print();\n\
Processing startup macro...\n\
\n\
RooWorkspace(wspace) simple workspace contents\n\
\n\
variables\n\
---------\n\
[#1] ERROR:InputArguments -- stale engine chatter\n\
(mhyp,mrec)\n\
\n\
p.d.f.s\n\
-------\n\
RooGaussian::gaussian[ x=mrec mean=mean sigma=s ] = 0.5\n\
\n\
functions\n\
--------\n\
RooFormulaVar::mean[ actualVars=(mhyp) formula=\"@0\" ] = 125\n\
\n\
datasets\n\
--------\n\
RooDataSet::data.set(mrec)\n";

    fn formula_dump(address: &str, clients: &[(&str, &str, &str)], var: &str) -> String {
        let mut out = dump_text(address, clients, &[("0x1", "RooRealVar", var)]);
        out.push_str(&format!(
            "  Proxies: \n    actualVars -> \n      1)  {}\n--- RooFormula ---\n  Formula: \"@0\"\n",
            var
        ));
        out
    }

    fn headings_transcript() -> BTreeMap<String, String> {
        let mut outputs = BTreeMap::new();
        outputs.insert(summary_command("wspace"), SUMMARY.to_string());

        let mean = ("0x3", "RooFormulaVar", "mean");
        let gauss = ("0x4", "RooGaussian", "gaussian");
        outputs.insert(
            verbose_print_command("wspace", "mhyp"),
            dump_text("0x1", &[mean], &[]),
        );
        outputs.insert(
            verbose_print_command("wspace", "mrec"),
            dump_text("0x2", &[gauss], &[]),
        );
        outputs.insert(
            verbose_print_command("wspace", "mean"),
            formula_dump("0x3", &[gauss], "mhyp"),
        );
        outputs.insert(
            verbose_print_command("wspace", "gaussian"),
            dump_text(
                "0x4",
                &[],
                &[
                    ("0x2", "RooRealVar", "mrec"),
                    ("0x3", "RooFormulaVar", "mean"),
                    ("0x6", "RooConstVar", "c0"),
                ],
            ),
        );
        outputs.insert(
            verbose_print_command("wspace", "data.set"),
            "--- RooAbsArg ---\n  Address: 0x5\n".to_string(),
        );
        // c0 is absent from the summary, fetched by the backfill pass
        outputs.insert(
            verbose_print_command("wspace", "c0"),
            dump_text("0x6", &[("0x4", "RooGaussian", "gaussian")], &[]),
        );
        outputs
    }

    #[test]
    fn headings_scan_builds_the_full_workspace() {
        let mut session = ReplaySession::new(headings_transcript());
        let ws = read_workspace(
            &mut session,
            "transcript",
            "wspace",
            ResolutionMode::ByName,
            ScanStrategy::Headings,
        )
        .unwrap();

        assert_eq!(ws.name(), "wspace");
        // 5 listed members plus the backfilled constant
        assert_eq!(ws.len(), 6);

        let gauss = ws.find_by_name("gaussian").unwrap();
        assert_eq!(ws.member(gauss).kind, MemberKind::Pdf);
        assert_eq!(ws.servers_of(gauss).unwrap().len(), 3);
        assert_eq!(ws.overall_num_servers(gauss).unwrap(), 4);

        let c0 = ws.find_by_name("c0").unwrap();
        assert_eq!(ws.member(c0).kind, MemberKind::ConstVar);

        // dotted dataset names survive
        let data = ws.find_by_name("data.set").unwrap();
        assert_eq!(ws.member(data).kind, MemberKind::Dataset);

        match &ws.member(ws.find_by_name("mean").unwrap()).kind {
            MemberKind::FormulaVar(formula) => {
                assert_eq!(formula.expand().unwrap(), "mhyp");
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn type_flag_scan_applies_flag_precedence() {
        let macro_output = "\
RooRealVar,0,0,1,0,1,0,mhyp\n\
RooConstVar,0,1,0,0,1,0,c0\n\
RooGaussian,1,0,0,0,1,0,gaussian\n\
RooDataSet,0,0,0,1,0,0,data\n\
RooCategory,0,0,0,0,0,1,cat\n\
TUnknown,0,0,0,0,0,0,weird\n";

        let mut outputs = BTreeMap::new();
        outputs.insert(type_flag_summary_command("wspace"), macro_output.to_string());
        let gauss = ("0x3", "RooGaussian", "gaussian");
        outputs.insert(
            verbose_print_command("wspace", "mhyp"),
            dump_text("0x1", &[gauss], &[]),
        );
        outputs.insert(
            verbose_print_command("wspace", "c0"),
            dump_text("0x2", &[gauss], &[]),
        );
        outputs.insert(
            verbose_print_command("wspace", "gaussian"),
            dump_text(
                "0x3",
                &[],
                &[("0x1", "RooRealVar", "mhyp"), ("0x2", "RooConstVar", "c0")],
            ),
        );
        outputs.insert(
            verbose_print_command("wspace", "data"),
            "--- RooAbsArg ---\n  Address: 0x4\n".to_string(),
        );
        outputs.insert(
            verbose_print_command("wspace", "cat"),
            dump_text("0x5", &[], &[]),
        );
        outputs.insert(value_query_command("wspace", "mhyp"), "2.5,1\n".to_string());

        let mut session = ReplaySession::new(outputs);
        let ws = read_workspace(
            &mut session,
            "transcript",
            "wspace",
            ResolutionMode::ByAddress,
            ScanStrategy::TypeFlags,
        )
        .unwrap();

        // the unflagged component was skipped
        assert_eq!(ws.len(), 5);

        let mhyp = ws.find_by_name("mhyp").unwrap();
        match &ws.member(mhyp).kind {
            MemberKind::RealVar(data) => {
                assert_eq!(data.value, Some(2.5));
                assert_eq!(data.is_constant, Some(true));
            }
            other => panic!("unexpected kind {:?}", other),
        }

        assert_eq!(ws.member(ws.find_by_name("c0").unwrap()).kind, MemberKind::ConstVar);
        assert_eq!(ws.member(ws.find_by_name("gaussian").unwrap()).kind, MemberKind::Pdf);
        assert_eq!(ws.member(ws.find_by_name("cat").unwrap()).kind, MemberKind::Category);
    }

    #[test]
    fn session_chatter_before_the_title_is_skipped() {
        // the command echo is not a heading group
        let mut session = ReplaySession::new(headings_transcript());
        let ws = read_workspace(
            &mut session,
            "transcript",
            "wspace",
            ResolutionMode::ByName,
            ScanStrategy::Headings,
        )
        .unwrap();
        assert_eq!(ws.len(), 6);
    }

    #[test]
    fn title_for_a_different_workspace_is_rejected() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            summary_command("wspace"),
            "RooWorkspace(other) other contents\n\nvariables\n---------\n(x)\n".to_string(),
        );
        let mut session = ReplaySession::new(outputs);
        let err = read_workspace(
            &mut session,
            "transcript",
            "wspace",
            ResolutionMode::ByName,
            ScanStrategy::Headings,
        )
        .unwrap_err();
        assert!(err.to_string().contains("title line for workspace 'wspace'"));
    }

    #[test]
    fn missing_title_is_fatal() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            summary_command("wspace"),
            "variables\n---------\n(x)\n".to_string(),
        );
        let mut session = ReplaySession::new(outputs);
        let err = read_workspace(
            &mut session,
            "transcript",
            "wspace",
            ResolutionMode::ByName,
            ScanStrategy::Headings,
        )
        .unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn unknown_heading_is_fatal() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            summary_command("wspace"),
            "RooWorkspace(wspace) wspace contents\n\nsurprises\n---------\nthing\n".to_string(),
        );
        let mut session = ReplaySession::new(outputs);
        let err = read_workspace(
            &mut session,
            "transcript",
            "wspace",
            ResolutionMode::ByName,
            ScanStrategy::Headings,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown heading"));
    }

    #[test]
    fn unparsable_dump_reports_a_member_parse_error() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            summary_command("wspace"),
            "RooWorkspace(wspace) wspace contents\n\nvariables\n---------\n(x)\n".to_string(),
        );
        // dump without an Address entry
        outputs.insert(
            verbose_print_command("wspace", "x"),
            "--- RooAbsArg ---\n  Value State: DIRTY\n".to_string(),
        );
        let mut session = ReplaySession::new(outputs);
        let err = read_workspace(
            &mut session,
            "transcript",
            "wspace",
            ResolutionMode::ByName,
            ScanStrategy::Headings,
        )
        .unwrap_err();

        let parse_err = err.downcast_ref::<MemberParseError>().unwrap();
        assert_eq!(parse_err.var_name, "x");
        assert!(parse_err.verbose_message().contains("Value State"));
    }

    #[test]
    fn value_output_parsing() {
        assert_eq!(parse_value_output("2.5,1\n").unwrap(), (2.5, true));
        assert_eq!(parse_value_output("\n-1e-3,0\n").unwrap(), (-1e-3, false));
        assert!(parse_value_output("").is_err());
        assert!(parse_value_output("nope").is_err());
    }

    #[test]
    fn value_update_reaches_session_and_model() {
        let mut session = ReplaySession::new(headings_transcript());
        let mut ws = read_workspace(
            &mut session,
            "transcript",
            "wspace",
            ResolutionMode::ByName,
            ScanStrategy::Headings,
        )
        .unwrap();

        let mut outputs = headings_transcript();
        outputs.insert(set_value_command("wspace", "mhyp", 126.0), String::new());
        let mut session = ReplaySession::new(outputs);

        let dispatcher = ModificationDispatcher::new();
        let mhyp = ws.find_by_name("mhyp").unwrap();
        push_value_update(&mut session, &mut ws, &dispatcher, "wspace", mhyp, 126.0).unwrap();

        match &ws.member(mhyp).kind {
            MemberKind::RealVar(data) => assert_eq!(data.value, Some(126.0)),
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
