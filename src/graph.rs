//! Renderable dependency graphs extracted from a finalized workspace.
//!
//! A graph is a flat node list plus `[server, client]` index pairs, ready
//! for JSON embedding. Every node carries its minimal depth: 0 for members
//! with no dependencies, otherwise one more than the shallowest
//! dependency. The renderer lays nodes out in depth layers.

use crate::Result;
use crate::workspace::Workspace;

use anyhow::bail;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub name: String,
    pub class_name: String,
    pub kind: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepGraph {
    pub nodes: Vec<GraphNode>,
    /// Directed `[server, client]` pairs indexing into `nodes`.
    pub edges: Vec<[usize; 2]>,
}

/// The whole workspace as one graph.
pub fn make_full_graph(ws: &Workspace) -> Result<DepGraph> {
    let members: Vec<usize> = (0..ws.len()).collect();
    build(ws, &members)
}

/// The sub-graph of one member and everything it transitively depends on.
pub fn make_single_root_graph(ws: &Workspace, root_id: usize) -> Result<DepGraph> {
    let mut included = BTreeSet::new();
    let mut todo = vec![root_id];
    while let Some(id) = todo.pop() {
        if !included.insert(id) {
            continue;
        }
        todo.extend_from_slice(ws.servers_of(id)?);
    }
    let members: Vec<usize> = included.into_iter().collect();
    build(ws, &members)
}

fn build(ws: &Workspace, members: &[usize]) -> Result<DepGraph> {
    let local: BTreeMap<usize, usize> = members
        .iter()
        .enumerate()
        .map(|(local_id, &ws_id)| (ws_id, local_id))
        .collect();

    // per-node dependency lists in local indices
    let mut servers: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
    let mut edges = BTreeSet::new();
    for (&ws_id, &local_id) in &local {
        for &server in ws.servers_of(ws_id)? {
            // outside the included set only when building a sub-graph;
            // such edges have no local endpoint and are dropped
            let Some(&server_local) = local.get(&server) else {
                continue;
            };
            if edges.insert([server_local, local_id]) {
                servers[local_id].push(server_local);
            }
        }
    }

    let depths = assign_depths(ws, members, &servers)?;

    let nodes = members
        .iter()
        .zip(&depths)
        .map(|(&ws_id, &depth)| {
            let member = ws.member(ws_id);
            GraphNode {
                name: member.var_name.clone(),
                class_name: member.class_name.clone(),
                kind: member.kind.label().to_string(),
                depth,
            }
        })
        .collect();

    Ok(DepGraph {
        nodes,
        edges: edges.into_iter().collect(),
    })
}

/// Minimal depth per node, memoized. The workspace graph is checked for
/// cycles at finalize time, so hitting one here means the edge lists were
/// tampered with; fail instead of recursing forever.
fn assign_depths(ws: &Workspace, members: &[usize], servers: &[Vec<usize>]) -> Result<Vec<usize>> {
    fn depth_of(
        ws: &Workspace,
        members: &[usize],
        servers: &[Vec<usize>],
        id: usize,
        memo: &mut Vec<Option<usize>>,
        on_path: &mut Vec<bool>,
    ) -> Result<usize> {
        if let Some(depth) = memo[id] {
            return Ok(depth);
        }
        if on_path[id] {
            bail!(
                "dependency cycle through '{}' while assigning depths",
                ws.member(members[id]).var_name
            );
        }

        on_path[id] = true;
        let mut shallowest = None;
        for &server in &servers[id] {
            let below = depth_of(ws, members, servers, server, memo, on_path)?;
            shallowest = Some(shallowest.map_or(below, |d: usize| d.min(below)));
        }
        on_path[id] = false;

        let depth = match shallowest {
            None => 0,
            Some(d) => d + 1,
        };
        memo[id] = Some(depth);
        Ok(depth)
    }

    let mut memo = vec![None; members.len()];
    let mut on_path = vec![false; members.len()];
    let mut depths = Vec::with_capacity(members.len());
    for id in 0..members.len() {
        depths.push(depth_of(ws, members, servers, id, &mut memo, &mut on_path)?);
    }
    Ok(depths)
}
