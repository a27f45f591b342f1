//! Lazy, memoized reactors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::graph::{Reactor, ReactorKind};
use crate::id::ReactorId;
use crate::store::{Node, Schema};

use super::scheduler::{Scheduler, SpySession};

/// A memoized computation over observable state.
///
/// `get` recomputes only when a recorded dependency changed since the last
/// run. The result is kept in a backing node that shares the reactor's id,
/// so reading a derived value records a dependency on it and change
/// propagation chains through derivations hop by hop.
///
/// A derived value starts dormant: it joins the dependency graph the first
/// time it is read from inside a running reactor. Dormant reads still
/// produce the right value, they just recompute every time.
pub struct DerivedValue {
    id: ReactorId,
    scheduler: Arc<Scheduler>,
    producer: Box<dyn Fn() -> Value + Send + Sync>,
    stale: AtomicBool,
    alive: AtomicBool,
    disposed: AtomicBool,
    backing: Mutex<Option<Arc<Node>>>,
}

impl DerivedValue {
    /// Create a dormant derived value.
    pub fn new<F>(scheduler: &Arc<Scheduler>, producer: F) -> Arc<DerivedValue>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Arc::new(DerivedValue {
            id: ReactorId::new(),
            scheduler: scheduler.clone(),
            producer: Box::new(producer),
            stale: AtomicBool::new(true),
            alive: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            backing: Mutex::new(None),
        })
    }

    pub fn id(&self) -> ReactorId {
        self.id
    }

    /// Current value, recomputing first if a dependency changed.
    pub fn get(self: &Arc<Self>) -> Value {
        // Reading a derived value is itself a tracked read of its output.
        self.scheduler
            .record_read(self.id.as_node(), String::new());
        if self.stale.load(Ordering::SeqCst) && !self.disposed.load(Ordering::SeqCst) {
            if !self.alive.load(Ordering::SeqCst)
                && (self.scheduler.is_running() || self.scheduler.is_learning())
            {
                // First read from inside a reactor: join the graph so the
                // scheduler can keep the memo fresh from now on.
                self.alive.store(true, Ordering::SeqCst);
                self.scheduler
                    .register_reactor(self.clone() as Arc<dyn Reactor>);
            }
            self.recompute();
        }
        let backing = self.backing.lock();
        match backing.as_ref() {
            Some(node) => node.snapshot(),
            None => Value::Null,
        }
    }

    /// The backing node holding the memoized output, computing it first if
    /// it never ran.
    pub fn node(self: &Arc<Self>) -> Option<Arc<Node>> {
        if self.backing.lock().is_none() {
            let _ = self.get();
        }
        self.backing.lock().clone()
    }

    fn recompute(self: &Arc<Self>) {
        let _running = self.scheduler.run_guard();
        let session = SpySession::begin(&self.scheduler, self.id);
        let value = (self.producer)();
        let deps = session.finish();
        trace!(reactor = self.id.raw(), deps = deps.len(), "derived recomputed");
        if self.alive.load(Ordering::SeqCst)
            && self.scheduler.replace_deps(self.id, deps).is_ok()
        {
            self.stale.store(false, Ordering::SeqCst);
        }
        // Sync the output with recording suppressed: backing writes are
        // bookkeeping, not dependencies of the enclosing session.
        self.scheduler.pause_spying();
        {
            let mut backing = self.backing.lock();
            match backing.as_ref() {
                Some(node) => node.sync_value(value),
                None => {
                    *backing = Some(Node::tree_with_id(
                        &self.scheduler,
                        Schema::Any,
                        value,
                        self.id.as_node(),
                    ));
                }
            }
        }
        self.scheduler.resume_spying();
    }

    /// Permanently retire this derived value.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.scheduler.dispose_reactor(self.id);
    }
}

impl Reactor for DerivedValue {
    fn id(&self) -> ReactorId {
        self.id
    }

    fn kind(&self) -> ReactorKind {
        ReactorKind::Derived
    }

    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    fn mark_stale(&self) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.stale.store(true, Ordering::SeqCst);
        }
    }

    fn run_if_stale(self: Arc<Self>) {
        if self.disposed.load(Ordering::SeqCst)
            || !self.stale.load(Ordering::SeqCst)
            || !self.alive.load(Ordering::SeqCst)
        {
            return;
        }
        self.recompute();
    }

    fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}
