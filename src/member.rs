//! Typed records for workspace members.
//!
//! The engine reports a declared class name for every component; the class
//! name string (plus the summary group the component was listed under)
//! selects the member kind. Unrecognized names fall back to a generic kind
//! rather than failing the scan.

use crate::Result;
use crate::dump::{ARG_SECTION, ClientServerRecord, VerboseOutput};
use crate::formula::FormulaData;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Declared class name of the constant-value type. The engine omits these
/// from the workspace summary listing, so the scanner backfills them from
/// server cross-references.
pub const CONST_VAR_CLASS: &str = "RooConstVar";

/// Which summary group (or type flag) a component was discovered under.
/// Used together with the class name to select the member kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindHint {
    Variable,
    ConstVar,
    Pdf,
    Function,
    Dataset,
    Category,
    Unknown,
}

/// Value state of a mutable real variable. Both fields stay `None` until
/// the supplementary targeted value query has run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RealVarData {
    pub value: Option<f64>,
    pub is_constant: Option<bool>,
}

/// The member kind, tagged with kind-specific payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberKind {
    RealVar(RealVarData),
    ConstVar,
    Pdf,
    Function,
    FormulaVar(FormulaData),
    RecursiveFraction,
    HistFunc,
    Dataset,
    Category,
    /// Fallback for class names and groups we do not recognize.
    Generic,
}

impl MemberKind {
    /// Short human-readable label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            MemberKind::RealVar(_) => "variable",
            MemberKind::ConstVar => "constant",
            MemberKind::Pdf => "p.d.f.",
            MemberKind::Function => "function",
            MemberKind::FormulaVar(_) => "formula",
            MemberKind::RecursiveFraction => "recursive fraction",
            MemberKind::HistFunc => "histogram function",
            MemberKind::Dataset => "dataset",
            MemberKind::Category => "category",
            MemberKind::Generic => "generic",
        }
    }
}

/// Selects the member kind from the declared class name, falling back on
/// the summary group the component was listed under.
pub fn select_kind(class_name: &str, hint: KindHint, dump: &VerboseOutput) -> Result<MemberKind> {
    match class_name {
        "RooFormulaVar" => return Ok(MemberKind::FormulaVar(FormulaData::parse(dump)?)),
        "RooRecursiveFraction" => return Ok(MemberKind::RecursiveFraction),
        "RooHistFunc" => return Ok(MemberKind::HistFunc),
        CONST_VAR_CLASS => return Ok(MemberKind::ConstVar),
        _ => {}
    }

    Ok(match hint {
        KindHint::Variable => MemberKind::RealVar(RealVarData::default()),
        KindHint::ConstVar => MemberKind::ConstVar,
        KindHint::Pdf => MemberKind::Pdf,
        KindHint::Function => MemberKind::Function,
        KindHint::Dataset => MemberKind::Dataset,
        KindHint::Category => MemberKind::Category,
        KindHint::Unknown => MemberKind::Generic,
    })
}

/// One identified, typed workspace component.
///
/// Identity is the address string reported in the verbose dump (stable
/// within one engine session). The raw client/server cross-reference
/// records stay attached until the owning workspace resolves them into
/// graph edges; `None` means the dump carried no relationship block at
/// all, which is distinct from an empty one.
#[derive(Debug, Clone)]
pub struct Member {
    pub var_name: String,
    pub class_name: String,
    pub address: String,
    pub kind: MemberKind,
    pub dump: VerboseOutput,
    pub server_records: Option<Vec<ClientServerRecord>>,
    pub client_records: Option<Vec<ClientServerRecord>>,
}

impl Member {
    /// Builds a member from the raw verbose dump of one component.
    ///
    /// The identity address and (for formula members) the formula block are
    /// required; their absence is a structural parse failure.
    pub fn from_dump(
        var_name: &str,
        class_name: &str,
        hint: KindHint,
        raw_output: &str,
    ) -> Result<Member> {
        let dump = VerboseOutput::new(raw_output);

        let address = dump.find_value(ARG_SECTION, "Address").ok_or_else(|| {
            anyhow!(
                "no Address entry in the {} section of the dump of '{}'",
                ARG_SECTION,
                var_name
            )
        })?;

        let client_records = dump.parse_clients_or_servers(ARG_SECTION, false)?;
        let server_records = dump.parse_clients_or_servers(ARG_SECTION, true)?;
        let kind = select_kind(class_name, hint, &dump)?;

        Ok(Member {
            var_name: var_name.to_string(),
            class_name: class_name.to_string(),
            address,
            kind,
            dump,
            server_records,
            client_records,
        })
    }

    /// The server cross-references, flattened: an absent block reads as no
    /// dependencies.
    pub fn server_records(&self) -> &[ClientServerRecord] {
        self.server_records.as_deref().unwrap_or(&[])
    }

    pub fn client_records(&self) -> &[ClientServerRecord] {
        self.client_records.as_deref().unwrap_or(&[])
    }

    /// True if the dump reported at least one relationship block.
    pub fn has_relationship_data(&self) -> bool {
        self.server_records.is_some() || self.client_records.is_some()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn from_dump_extracts_identity_and_records() {
        let raw = fixtures::dump_text(
            "0x10",
            &[("0x20", "RooGaussian", "gaussian")],
            &[("0x30", "RooRealVar", "mhyp"), ("0x40", "RooConstVar", "c0")],
        );
        let member = Member::from_dump("mean", "RooAbsReal", KindHint::Function, &raw).unwrap();

        assert_eq!(member.address, "0x10");
        assert_eq!(member.kind, MemberKind::Function);
        assert_eq!(member.server_records().len(), 2);
        assert_eq!(member.client_records().len(), 1);
        assert_eq!(member.server_records()[1].class_name, CONST_VAR_CLASS);
        assert!(member.has_relationship_data());
    }

    #[test]
    fn missing_address_is_fatal() {
        let raw = "--- RooAbsArg ---\n  Value State: DIRTY\n";
        let err = Member::from_dump("x", "RooRealVar", KindHint::Variable, raw).unwrap_err();
        assert!(err.to_string().contains("Address"));
    }

    #[test]
    fn dataset_without_relationship_blocks() {
        let raw = "--- RooAbsArg ---\n  Address: 0x99\n";
        let member = Member::from_dump("data", "RooDataSet", KindHint::Dataset, raw).unwrap();
        assert!(!member.has_relationship_data());
        assert!(member.server_records().is_empty());
        assert_eq!(member.kind, MemberKind::Dataset);
    }

    #[test]
    fn kind_selection_dispatches_on_class_name() {
        let dump = VerboseOutput::new("--- RooAbsArg ---\n  Address: 0x1\n");
        assert_eq!(
            select_kind("RooRecursiveFraction", KindHint::Function, &dump).unwrap(),
            MemberKind::RecursiveFraction
        );
        assert_eq!(
            select_kind("RooHistFunc", KindHint::Function, &dump).unwrap(),
            MemberKind::HistFunc
        );
        assert_eq!(
            select_kind("RooConstVar", KindHint::Unknown, &dump).unwrap(),
            MemberKind::ConstVar
        );
        assert_eq!(
            select_kind("RooAddPdf", KindHint::Pdf, &dump).unwrap(),
            MemberKind::Pdf
        );
        assert_eq!(
            select_kind("SomethingNew", KindHint::Unknown, &dump).unwrap(),
            MemberKind::Generic
        );
    }
}
