//! Reactor registry and dependency resolution.
//!
//! # How It Works
//!
//! Every registered reactor owns an entry holding its handle and the list
//! of addresses it read on its last run. Matching is done at node
//! granularity: a change to a node affects every reactor that recorded any
//! address on that node. Because a derived value's output node shares the
//! reactor's id, chasing targets transitively walks derivation chains with
//! the same matching rule.
//!
//! The table is scanned linearly per lookup. Graphs here are small (one
//! entry per live reactor) and lookups happen once per commit, so an index
//! keyed by node has not been worth its bookkeeping.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use crate::error::ReactiveError;
use crate::id::{NodeId, ReactorId};
use crate::reactive::Address;

use super::{Reactor, ReactorKind};

struct Entry {
    reactor: Arc<dyn Reactor>,
    deps: SmallVec<[Address; 4]>,
}

/// Registry of live reactors and their recorded dependencies.
#[derive(Default)]
pub struct DepGraph {
    entries: HashMap<ReactorId, Entry>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reactor with an empty dependency list. Re-registering an
    /// existing id is a no-op.
    pub fn register(&mut self, reactor: Arc<dyn Reactor>) {
        let id = reactor.id();
        self.entries.entry(id).or_insert(Entry {
            reactor,
            deps: SmallVec::new(),
        });
    }

    pub fn reactor(&self, id: ReactorId) -> Option<Arc<dyn Reactor>> {
        self.entries.get(&id).map(|e| e.reactor.clone())
    }

    pub fn contains(&self, id: ReactorId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Swap in a freshly recorded dependency list after a run.
    pub fn replace_deps(
        &mut self,
        id: ReactorId,
        deps: SmallVec<[Address; 4]>,
    ) -> Result<(), ReactiveError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(ReactiveError::UnknownDependency { id })?;
        entry.deps = deps;
        Ok(())
    }

    /// All reactors affected by a change to `node`, directly or through
    /// derived values, in discovery order (creation order within each hop).
    pub fn targets(&self, node: NodeId) -> Vec<ReactorId> {
        let mut out: Vec<ReactorId> = Vec::new();
        let mut queue: VecDeque<u64> = VecDeque::from([node.raw()]);
        let mut seen: Vec<u64> = vec![node.raw()];
        while let Some(raw) = queue.pop_front() {
            for id in self.direct_targets(raw) {
                if !out.contains(&id) {
                    out.push(id);
                    // A derived value's output node shares the reactor id,
                    // so its consumers are one hop further.
                    if !seen.contains(&id.raw()) {
                        seen.push(id.raw());
                        queue.push_back(id.raw());
                    }
                }
            }
        }
        out
    }

    /// Reactors that currently read the given derived value's output.
    pub fn consumers(&self, derived: ReactorId) -> Vec<ReactorId> {
        self.direct_targets(derived.raw())
    }

    fn direct_targets(&self, raw: u64) -> Vec<ReactorId> {
        let mut hits: Vec<ReactorId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deps.iter().any(|a| a.node.raw() == raw))
            .map(|(id, _)| *id)
            .collect();
        hits.sort_by_key(|id| id.raw());
        hits
    }

    /// Remove a reactor and recursively retire derived values that lose
    /// their last consumer through the removal.
    pub fn dispose(&mut self, id: ReactorId) {
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        entry.reactor.mark_disposed();
        trace!(reactor = id.raw(), "reactor disposed");
        for addr in &entry.deps {
            let raw = addr.node.raw();
            let candidate = self
                .entries
                .iter()
                .find(|(rid, e)| rid.raw() == raw && e.reactor.kind() == ReactorKind::Derived)
                .map(|(rid, _)| *rid);
            if let Some(derived) = candidate {
                if self.consumers(derived).is_empty() {
                    self.dispose(derived);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
