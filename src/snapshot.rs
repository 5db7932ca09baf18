//! Saving and restoring a finalized workspace without an engine session.
//!
//! A snapshot keeps, per member, the raw verbose dump plus the resolved
//! edge lists as identity keys. Restoring re-parses the dumps but installs
//! the stored edges directly: the repair pass already ran before the
//! snapshot was taken, and re-running resolution would only re-derive the
//! same lists.

use crate::Result;
use crate::dump::{ARG_SECTION, VerboseOutput};
use crate::member::{Member, MemberKind};
use crate::workspace::{ResolutionMode, Workspace};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub var_name: String,
    pub class_name: String,
    pub address: String,
    pub kind: MemberKind,
    pub raw_output: String,
    /// Identity keys of the direct dependencies.
    pub servers: Vec<String>,
    /// Identity keys of the direct dependents.
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub source: String,
    pub name: String,
    pub mode: ResolutionMode,
    pub members: Vec<MemberSnapshot>,
}

impl WorkspaceSnapshot {
    /// Captures a finalized workspace.
    pub fn capture(ws: &Workspace) -> Result<WorkspaceSnapshot> {
        let mut members = Vec::with_capacity(ws.len());
        for id in 0..ws.len() {
            let member = ws.member(id);
            let keys = |ids: &[usize]| -> Vec<String> {
                ids.iter().map(|&i| ws.identity_key(i).to_string()).collect()
            };
            members.push(MemberSnapshot {
                var_name: member.var_name.clone(),
                class_name: member.class_name.clone(),
                address: member.address.clone(),
                kind: member.kind.clone(),
                raw_output: member.dump.original_output().to_string(),
                servers: keys(ws.servers_of(id)?),
                clients: keys(ws.clients_of(id)?),
            });
        }
        Ok(WorkspaceSnapshot {
            source: ws.source().to_string(),
            name: ws.name().to_string(),
            mode: ws.mode(),
            members,
        })
    }

    /// Rebuilds the workspace: re-parse every stored dump, then install
    /// the stored edge lists.
    pub fn restore(&self) -> Result<Workspace> {
        let mut ws = Workspace::new(&self.source, &self.name, self.mode);

        for snap in &self.members {
            let dump = VerboseOutput::new(&snap.raw_output);
            let server_records = dump.parse_clients_or_servers(ARG_SECTION, true)?;
            let client_records = dump.parse_clients_or_servers(ARG_SECTION, false)?;
            ws.register(Member {
                var_name: snap.var_name.clone(),
                class_name: snap.class_name.clone(),
                address: snap.address.clone(),
                kind: snap.kind.clone(),
                dump,
                server_records,
                client_records,
            })?;
        }

        let lookup = |key: &str| -> Result<usize> {
            let found = match self.mode {
                ResolutionMode::ByAddress => ws.find_by_address(key),
                ResolutionMode::ByName => ws.find_by_name(key),
            };
            match found {
                Some(id) => Ok(id),
                None => bail!("snapshot references unknown member {:?}", key),
            }
        };

        let mut servers = Vec::with_capacity(self.members.len());
        let mut clients = Vec::with_capacity(self.members.len());
        for snap in &self.members {
            servers.push(snap.servers.iter().map(|k| lookup(k)).collect::<Result<_>>()?);
            clients.push(snap.clients.iter().map(|k| lookup(k)).collect::<Result<_>>()?);
        }
        ws.install_edges(servers, clients)?;
        Ok(ws)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("write snapshot {}", path.display()))
    }

    pub fn load_from_file(path: &Path) -> Result<WorkspaceSnapshot> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read snapshot {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse snapshot {}", path.display()))
    }
}
