//! Formula members: template extraction and placeholder expansion.
//!
//! A formula member stores its expression as a template with zero-indexed
//! placeholders (`@0`, `@1`, ...). The placeholder order is given by the
//! `actualVars ->` sub-block of the Proxies listing and by nothing else:
//! neither the server order nor the variable list printed after the
//! formula line matches the placeholder numbering.

use crate::Result;
use crate::dump::{ARG_SECTION, VerboseOutput};

use anyhow::bail;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Section of the verbose dump holding the formula line.
const FORMULA_SECTION: &str = "RooFormula";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaData {
    /// The template as given to the engine. May contain no placeholders at
    /// all when the formula names its variables directly.
    pub template: String,
    /// Placeholder substitution list: `@N` expands to `variable_names[N]`.
    pub variable_names: Vec<String>,
}

impl FormulaData {
    /// Extracts the formula template and the ordered variable names from a
    /// verbose dump. Both the `Formula: "..."` line and the
    /// `actualVars ->` sub-block header are required.
    pub fn parse(dump: &VerboseOutput) -> Result<FormulaData> {
        let Some(lines) = dump.section(FORMULA_SECTION) else {
            bail!("no {} section in formula dump", FORMULA_SECTION);
        };

        // e.g.  Formula: "@0 - 5 * (@0/200)**2"
        const FORMULA_RE: &str = r#"^\s*Formula: "([^"]+)"\s*$"#;
        let re = Regex::new(FORMULA_RE)?;

        let mut template = None;
        for line in lines {
            if let Some(caps) = re.captures(line) {
                template = Some(caps.get(1).unwrap().as_str().to_string());
                break;
            }
        }
        let Some(template) = template else {
            bail!("could not find formula line in {} section", FORMULA_SECTION);
        };

        let Some(mut proxies) = dump.find_sub_section(ARG_SECTION, "Proxies") else {
            bail!("could not find Proxies subsection in formula dump");
        };
        if proxies.is_empty() {
            bail!("empty Proxies subsection in formula dump");
        }

        let header = proxies.remove(0);
        if header.trim() != "actualVars ->" {
            bail!("expected 'actualVars ->', found '{}'", header.trim());
        }

        // e.g.    1)  mhyp
        const ACTUAL_VAR_RE: &str = r"^\s*\d+\)\s*(\S+)\s*$";
        let var_re = Regex::new(ACTUAL_VAR_RE)?;

        let mut variable_names = Vec::new();
        for line in &proxies {
            let Some(caps) = var_re.captures(line) else {
                bail!("unexpected line {:?} when reading actual variables", line);
            };
            variable_names.push(caps.get(1).unwrap().as_str().to_string());
        }

        Ok(FormulaData {
            template,
            variable_names,
        })
    }

    /// Substitutes every `@N` token with `variable_names[N]`, left to
    /// right, non-overlapping. A placeholder without a matching variable is
    /// an error.
    pub fn expand(&self) -> Result<String> {
        let re = Regex::new(r"@([0-9]+)")?;

        let mut out = String::new();
        let mut last = 0;
        for caps in re.captures_iter(&self.template) {
            let token = caps.get(0).unwrap();
            let index: usize = caps.get(1).unwrap().as_str().parse()?;

            let Some(name) = self.variable_names.get(index) else {
                bail!(
                    "formula placeholder @{} has no matching variable (have {})",
                    index,
                    self.variable_names.len()
                );
            };
            out.push_str(&self.template[last..token.start()]);
            out.push_str(name);
            last = token.end();
        }
        out.push_str(&self.template[last..]);
        Ok(out)
    }
}
