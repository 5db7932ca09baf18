//! The report data model: everything the HTML renderer embeds, flattened
//! into plain serializable values.

use crate::Result;
use crate::graph::{DepGraph, make_full_graph, make_single_root_graph};
use crate::member::MemberKind;
use crate::workspace::Workspace;

use anyhow::bail;
use serde::Serialize;
use std::collections::BTreeMap;

/// One member, flattened for display.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub name: String,
    pub class_name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_constant: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula_expanded: Option<String>,
    pub servers: Vec<String>,
    pub clients: Vec<String>,
    pub overall_num_servers: usize,
    pub overall_num_clients: usize,
    /// False for members whose dump carried no relationship blocks at all
    /// (typically datasets); the renderer flags these instead of showing
    /// misleading empty lists.
    pub has_relationship_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub workspace: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub members: BTreeMap<String, MemberView>,
    pub graph: DepGraph,
    /// Member count per kind label.
    pub totals: BTreeMap<String, usize>,
}

/// Builds the report for the whole workspace, or for the dependency cone
/// of one named member.
pub fn build_report_data(ws: &Workspace, root: Option<&str>) -> Result<ReportData> {
    let graph = match root {
        Some(name) => {
            let Some(id) = ws.find_by_name(name) else {
                bail!("no member named '{}' in workspace {}", name, ws.name());
            };
            make_single_root_graph(ws, id)?
        }
        None => make_full_graph(ws)?,
    };

    let mut members = BTreeMap::new();
    let mut totals: BTreeMap<String, usize> = BTreeMap::new();
    for id in 0..ws.len() {
        let view = member_view(ws, id)?;
        *totals.entry(view.kind.clone()).or_default() += 1;
        members.insert(view.name.clone(), view);
    }

    Ok(ReportData {
        workspace: ws.name().to_string(),
        source: ws.source().to_string(),
        root: root.map(str::to_string),
        members,
        graph,
        totals,
    })
}

fn member_view(ws: &Workspace, id: usize) -> Result<MemberView> {
    let member = ws.member(id);

    let (value, is_constant) = match &member.kind {
        MemberKind::RealVar(data) => (data.value, data.is_constant),
        _ => (None, None),
    };
    let (formula, formula_expanded) = match &member.kind {
        MemberKind::FormulaVar(data) => {
            (Some(data.template.clone()), Some(data.expand()?))
        }
        _ => (None, None),
    };

    let names = |ids: &[usize]| -> Vec<String> {
        ids.iter().map(|&i| ws.member(i).var_name.clone()).collect()
    };

    Ok(MemberView {
        name: member.var_name.clone(),
        class_name: member.class_name.clone(),
        kind: member.kind.label().to_string(),
        value,
        is_constant,
        formula,
        formula_expanded,
        servers: names(ws.servers_of(id)?),
        clients: names(ws.clients_of(id)?),
        overall_num_servers: ws.overall_num_servers(id)?,
        overall_num_clients: ws.overall_num_clients(id)?,
        has_relationship_data: member.has_relationship_data(),
    })
}
