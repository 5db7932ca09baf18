//! The member registry and the resolved dependency graph.
//!
//! A workspace is built in two phases. Phase 1 (the scan) registers
//! members carrying raw cross-reference records only. Phase 2
//! (`finalize`) resolves every record against the registry, repairs
//! one-sided client/server links, verifies the graph is acyclic and
//! freezes it. After that, only value updates on real variables are
//! allowed; the graph shape never changes again.

use crate::Result;
use crate::dump::ClientServerRecord;
use crate::member::{Member, MemberKind};

use anyhow::bail;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// How cross-reference records are resolved against the registry. Fixed at
/// construction: addresses drift between engine sessions, names do not, and
/// mixing the two silently breaks resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMode {
    ByAddress,
    ByName,
}

/// Edge lists of the frozen graph, indexed by member position, plus the
/// memoization caches for the transitive counts.
#[derive(Debug)]
struct ResolvedGraph {
    servers: Vec<Vec<usize>>,
    clients: Vec<Vec<usize>>,
    overall_servers: Mutex<BTreeMap<usize, usize>>,
    overall_clients: Mutex<BTreeMap<usize, usize>>,
}

/// The named collection of members read from one source, with address- and
/// name-keyed lookup over insertion-ordered storage.
#[derive(Debug)]
pub struct Workspace {
    source: String,
    name: String,
    mode: ResolutionMode,
    members: Vec<Member>,
    by_address: BTreeMap<String, usize>,
    by_name: BTreeMap<String, usize>,
    graph: Option<ResolvedGraph>,
}

impl Workspace {
    pub fn new(source: &str, name: &str, mode: ResolutionMode) -> Self {
        Self {
            source: source.to_string(),
            name: name.to_string(),
            mode,
            members: Vec::new(),
            by_address: BTreeMap::new(),
            by_name: BTreeMap::new(),
            graph: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, id: usize) -> &Member {
        &self.members[id]
    }

    /// The identity key of a member under the active resolution mode.
    pub fn identity_key(&self, id: usize) -> &str {
        let member = &self.members[id];
        match self.mode {
            ResolutionMode::ByAddress => &member.address,
            ResolutionMode::ByName => &member.var_name,
        }
    }

    pub fn find_by_address(&self, address: &str) -> Option<usize> {
        self.by_address.get(address).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Registers a member. Duplicate addresses or names are not rejected:
    /// the maps keep the last registration (the engine is known to repeat
    /// components in some dumps), but every collision is logged.
    pub fn register(&mut self, member: Member) -> Result<usize> {
        if self.graph.is_some() {
            bail!(
                "cannot register '{}' after the workspace graph was finalized",
                member.var_name
            );
        }

        let id = self.members.len();
        if let Some(prev) = self.by_address.insert(member.address.clone(), id) {
            warn!(
                address = %member.address,
                previous = %self.members[prev].var_name,
                new = %member.var_name,
                "duplicate address registration, keeping the newer member"
            );
        }
        if let Some(prev) = self.by_name.insert(member.var_name.clone(), id) {
            warn!(
                name = %member.var_name,
                previous_address = %self.members[prev].address,
                "duplicate name registration, keeping the newer member"
            );
        }
        self.members.push(member);
        Ok(id)
    }

    /// Resolves one cross-reference record under the active mode. The
    /// referenced member must already be registered; a failed lookup means
    /// the scan order was wrong or the dump is malformed, both fatal.
    pub fn resolve(&self, record: &ClientServerRecord) -> Result<usize> {
        let found = match self.mode {
            ResolutionMode::ByAddress => self.find_by_address(&record.address),
            ResolutionMode::ByName => self.find_by_name(&record.var_name),
        };
        match found {
            Some(id) => Ok(id),
            None => bail!(
                "could not find referenced member {} ({}) in workspace {} read from {}",
                record.address,
                record.var_name,
                self.name,
                self.source
            ),
        }
    }

    /// Phase 2: resolve all cross-reference records into edge lists, repair
    /// one-sided links, verify acyclicity and freeze the graph.
    pub fn finalize(&mut self) -> Result<()> {
        if self.graph.is_some() {
            bail!("workspace graph already finalized");
        }

        let count = self.members.len();
        let mut servers: Vec<Vec<usize>> = Vec::with_capacity(count);
        let mut clients: Vec<Vec<usize>> = Vec::with_capacity(count);
        for member in &self.members {
            let mut server_ids = Vec::new();
            for record in member.server_records() {
                server_ids.push(self.resolve(record)?);
            }
            let mut client_ids = Vec::new();
            for record in member.client_records() {
                client_ids.push(self.resolve(record)?);
            }
            servers.push(server_ids);
            clients.push(client_ids);
        }

        // Repair pass: the engine sometimes records only one direction of a
        // relationship. Append the missing reciprocal link; never remove.
        for id in 0..count {
            let my_clients = clients[id].clone();
            for client in my_clients {
                if !servers[client].contains(&id) {
                    info!(
                        client = %self.members[client].var_name,
                        server = %self.members[id].var_name,
                        "adding missing link from client to server"
                    );
                    servers[client].push(id);
                }
            }
            let my_servers = servers[id].clone();
            for server in my_servers {
                if !clients[server].contains(&id) {
                    info!(
                        server = %self.members[server].var_name,
                        client = %self.members[id].var_name,
                        "adding missing link from server to client"
                    );
                    clients[server].push(id);
                }
            }
        }

        self.check_acyclic(&servers)?;

        self.graph = Some(ResolvedGraph {
            servers,
            clients,
            overall_servers: Mutex::new(BTreeMap::new()),
            overall_clients: Mutex::new(BTreeMap::new()),
        });
        Ok(())
    }

    /// Depth-first coloring over the server edges. The downstream
    /// traversals assume a DAG, so a cycle is reported here, with its path,
    /// instead of hanging a query later.
    fn check_acyclic(&self, servers: &[Vec<usize>]) -> Result<()> {
        #[derive(Copy, Clone, PartialEq, Eq)]
        enum Mark {
            Temp,
            Perm,
        }

        fn visit(
            members: &[Member],
            servers: &[Vec<usize>],
            id: usize,
            marks: &mut BTreeMap<usize, Mark>,
            stack: &mut Vec<usize>,
        ) -> Result<()> {
            match marks.get(&id) {
                Some(Mark::Perm) => return Ok(()),
                Some(Mark::Temp) => {
                    let mut path: Vec<&str> =
                        stack.iter().map(|&i| members[i].var_name.as_str()).collect();
                    path.push(members[id].var_name.as_str());
                    bail!("dependency cycle detected: {}", path.join(" -> "));
                }
                None => {}
            }

            marks.insert(id, Mark::Temp);
            stack.push(id);
            for &server in &servers[id] {
                visit(members, servers, server, marks, stack)?;
            }
            stack.pop();
            marks.insert(id, Mark::Perm);
            Ok(())
        }

        let mut marks = BTreeMap::new();
        let mut stack = Vec::new();
        for id in 0..self.members.len() {
            stack.clear();
            visit(&self.members, servers, id, &mut marks, &mut stack)?;
        }
        Ok(())
    }

    fn graph(&self) -> Result<&ResolvedGraph> {
        match &self.graph {
            Some(graph) => Ok(graph),
            None => bail!("workspace graph not finalized yet"),
        }
    }

    /// Direct dependencies (members this one uses).
    pub fn servers_of(&self, id: usize) -> Result<&[usize]> {
        Ok(&self.graph()?.servers[id])
    }

    /// Direct dependents (members using this one).
    pub fn clients_of(&self, id: usize) -> Result<&[usize]> {
        Ok(&self.graph()?.clients[id])
    }

    /// Number of distinct members reachable through the server relation.
    /// Memoized per member; valid because the graph is frozen.
    pub fn overall_num_servers(&self, id: usize) -> Result<usize> {
        let graph = self.graph()?;
        Ok(Self::overall_count(&graph.servers, &graph.overall_servers, id))
    }

    /// Number of distinct members reachable through the client relation.
    pub fn overall_num_clients(&self, id: usize) -> Result<usize> {
        let graph = self.graph()?;
        Ok(Self::overall_count(&graph.clients, &graph.overall_clients, id))
    }

    /// Breadth-first count of distinct reachable nodes, excluding the
    /// start node itself.
    fn overall_count(
        edges: &[Vec<usize>],
        cache: &Mutex<BTreeMap<usize, usize>>,
        id: usize,
    ) -> usize {
        if let Some(&count) = cache.lock().get(&id) {
            return count;
        }

        let mut todo: Vec<usize> = edges[id].clone();
        let mut visited = BTreeSet::new();
        while let Some(next) = todo.pop() {
            if !visited.insert(next) {
                continue;
            }
            todo.extend_from_slice(&edges[next]);
        }

        let count = visited.len();
        cache.lock().insert(id, count);
        count
    }

    /// Updates the value state of a real variable in place. Allowed at any
    /// phase; never changes the graph shape.
    pub fn update_real_var(
        &mut self,
        id: usize,
        value: Option<f64>,
        is_constant: Option<bool>,
    ) -> Result<()> {
        let member = &mut self.members[id];
        match &mut member.kind {
            MemberKind::RealVar(data) => {
                if value.is_some() {
                    data.value = value;
                }
                if is_constant.is_some() {
                    data.is_constant = is_constant;
                }
                Ok(())
            }
            other => bail!(
                "member '{}' is a {}, not a mutable variable",
                member.var_name,
                other.label()
            ),
        }
    }

    /// Installs already-resolved edge lists, bypassing record resolution
    /// and repair. Used when restoring a workspace from a snapshot whose
    /// edges were repaired before serialization.
    pub fn install_edges(
        &mut self,
        servers: Vec<Vec<usize>>,
        clients: Vec<Vec<usize>>,
    ) -> Result<()> {
        if self.graph.is_some() {
            bail!("workspace graph already finalized");
        }
        if servers.len() != self.members.len() || clients.len() != self.members.len() {
            bail!(
                "edge lists cover {} members but the workspace has {}",
                servers.len(),
                self.members.len()
            );
        }
        self.graph = Some(ResolvedGraph {
            servers,
            clients,
            overall_servers: Mutex::new(BTreeMap::new()),
            overall_clients: Mutex::new(BTreeMap::new()),
        });
        Ok(())
    }
}
