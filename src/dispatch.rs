//! Change notification for workspace members.
//!
//! Listeners subscribe to a member by its identity key. When a member is
//! modified its own listeners fire first, then the listeners of every
//! transitive client, each member at most once per notification.

use crate::Result;
use crate::member::Member;
use crate::workspace::Workspace;

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

type Listener = Arc<dyn Fn(&Member) + Send + Sync>;

#[derive(Default)]
pub struct ModificationDispatcher {
    listeners: Mutex<BTreeMap<String, Vec<Listener>>>,
}

impl ModificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to modifications of the member with the given identity
    /// key (address or name, matching the workspace resolution mode).
    pub fn add_listener<F>(&self, identity_key: &str, listener: F)
    where
        F: Fn(&Member) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .entry(identity_key.to_string())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Notifies the listeners of the modified member and, when `propagate`
    /// is set, of everything that transitively depends on it.
    ///
    /// The table lock is not held while listeners run, so a listener may
    /// subscribe further listeners on this dispatcher.
    pub fn notify_modified(
        &self,
        ws: &Workspace,
        member_id: usize,
        propagate: bool,
    ) -> Result<()> {
        let mut visited = BTreeSet::new();
        let mut todo = vec![member_id];
        while let Some(id) = todo.pop() {
            if !visited.insert(id) {
                continue;
            }
            let matching: Vec<Listener> = self
                .listeners
                .lock()
                .get(ws.identity_key(id))
                .map(|listeners| listeners.to_vec())
                .unwrap_or_default();
            for listener in matching {
                listener(ws.member(id));
            }
            if propagate {
                todo.extend_from_slice(ws.clients_of(id)?);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.listeners.lock();
        f.debug_struct("ModificationDispatcher")
            .field("subscribed", &table.keys().collect::<Vec<_>>())
            .finish()
    }
}
