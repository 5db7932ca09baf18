//! Parsing of the verbose diagnostic dump produced for a single workspace
//! member (the output of a `Print("V")` command).
//!
//! The dump is split into named sections delimited by `--- NAME ---` lines;
//! lines before the first delimiter belong to the unnamed section `""`.
//! Within a section, values are `key: ...` lines and multi-line sub-blocks
//! are indentation-delimited (e.g. `Servers:` / `Clients:`).

use crate::Result;

use anyhow::bail;
use regex::Regex;
use std::collections::BTreeMap;

/// Name of the section carrying the member identity and its client/server
/// cross-references. All member classes of the engine report it.
pub const ARG_SECTION: &str = "RooAbsArg";

/// One cross-reference line from a `Servers:` or `Clients:` sub-block.
/// Pure data; resolution against the registry happens later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientServerRecord {
    pub address: String,
    pub class_name: String,
    pub var_name: String,
}

/// The parsed verbose dump of one member. The raw text is kept for
/// diagnostics; re-querying the model is side-effect-free and idempotent.
#[derive(Debug, Clone)]
pub struct VerboseOutput {
    original_output: String,
    sections: BTreeMap<String, Vec<String>>,
}

/// Returns the section name if the (trimmed) line is a `--- NAME ---`
/// delimiter, with NAME a single token.
fn section_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix("--- ")?.strip_suffix(" ---")?;
    if inner.is_empty() || inner.contains(char::is_whitespace) {
        return None;
    }
    Some(inner)
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

impl VerboseOutput {
    pub fn new(output: &str) -> Self {
        let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut current = String::new();

        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(name) = section_name(line) {
                current = name.to_string();
                continue;
            }
            sections.entry(current.clone()).or_default().push(line.to_string());
        }

        Self {
            original_output: output.to_string(),
            sections,
        }
    }

    /// The raw dump text, as received from the engine.
    pub fn original_output(&self) -> &str {
        &self.original_output
    }

    /// All lines of the given section, in order. `None` if the section
    /// never appeared.
    pub fn section(&self, section: &str) -> Option<&[String]> {
        self.sections.get(section).map(|lines| lines.as_slice())
    }

    /// Looks for a line of the form `key: ...` in the given section and
    /// returns the `...`. A missing key is an absence, not a failure.
    pub fn find_value(&self, section: &str, key: &str) -> Option<String> {
        for line in self.section(section)? {
            let rest = match line.trim_start().strip_prefix(key) {
                Some(rest) => rest,
                None => continue,
            };
            let rest = match rest.strip_prefix(':') {
                Some(rest) => rest,
                None => continue,
            };
            // the colon must be followed by at least one space
            if rest.starts_with(char::is_whitespace) {
                return Some(rest.trim_start().to_string());
            }
        }
        None
    }

    /// Finds the sub-block headed by `label:` inside `section`: the
    /// contiguous run of following lines indented strictly deeper than the
    /// label line. `None` (block absent) is distinct from an empty list --
    /// some member kinds never report relationship blocks at all.
    pub fn find_sub_section(&self, section: &str, label: &str) -> Option<Vec<String>> {
        let lines = self.section(section)?;

        let mut iter = lines.iter();
        let mut label_indent = None;
        for line in iter.by_ref() {
            let trimmed = line.trim_end();
            if trimmed.trim_start() == format!("{}:", label) {
                label_indent = Some(leading_spaces(trimmed));
                break;
            }
        }
        let label_indent = label_indent?;

        let mut block = Vec::new();
        for line in iter {
            if line.trim().is_empty() || leading_spaces(line) <= label_indent {
                break;
            }
            block.push(line.clone());
        }
        Some(block)
    }

    /// Parses the `Servers:` or `Clients:` sub-block of `section` into
    /// cross-reference records. A present block with a malformed line is a
    /// hard error: silently misparsing identity data is worse than failing
    /// loudly. An absent block returns `Ok(None)`.
    pub fn parse_clients_or_servers(
        &self,
        section: &str,
        want_servers: bool,
    ) -> Result<Option<Vec<ClientServerRecord>>> {
        let label = if want_servers { "Servers" } else { "Clients" };
        let lines = match self.find_sub_section(section, label) {
            Some(lines) => lines,
            None => return Ok(None),
        };

        // Example lines:
        //   (0x2fc1330,V-) RooHistFunc::funcf2cat1 "funcf2cat1"
        //   (0x1c34b80,V-) RooAddPdf::hggpdf_cat2 ""
        const RECORD_RE: &str = r#"^\s*\((0x\S+),\S+\)\s+(\S+)::(\S+)\s+"([^"]*)"\s*$"#;
        let re = Regex::new(RECORD_RE)?;

        let mut records = Vec::new();
        for line in &lines {
            let caps = match re.captures(line) {
                Some(caps) => caps,
                None => bail!(
                    "cannot parse {} cross-reference line: {:?}",
                    label.to_lowercase(),
                    line
                ),
            };
            records.push(ClientServerRecord {
                address: caps.get(1).unwrap().as_str().to_string(),
                class_name: caps.get(2).unwrap().as_str().to_string(),
                var_name: caps.get(3).unwrap().as_str().to_string(),
            });
        }
        Ok(Some(records))
    }
}
