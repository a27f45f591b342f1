//! Transaction and rerun orchestration.
//!
//! # How It Works
//!
//! The scheduler is the shared context tying a family of observable trees
//! to their reactors. It is an explicit, instantiable value: nothing here
//! lives in globals or thread-locals, so independent engines coexist in one
//! process and tests get a fresh world each.
//!
//! A commit proceeds in fixed order:
//!
//! 1. resolve affected reactors from the recorded dependency graph, in
//!    discovery order,
//! 2. mark them all stale,
//! 3. drain each touched root's patch buffer and notify its observer,
//! 4. learning phase: rerun stale reactors one by one, each re-recording
//!    its dependencies as it goes.
//!
//! Observers therefore always see the patch before any reactor reruns, and
//! no internal lock is ever held across a reactor body.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::ReactiveError;
use crate::graph::{DepGraph, Reactor};
use crate::id::{NodeId, ReactorId};
use crate::store::Node;

use super::spy::{Address, SpyStack};

#[derive(Default)]
struct TxnState {
    open: bool,
    depth: usize,
    /// Nodes registered as updated this transaction, first-touch order.
    updated: Vec<Arc<Node>>,
    /// Reactors that joined the graph while the transaction was open.
    awoken: Vec<ReactorId>,
}

/// Shared reactive context: transaction state, the dependency graph, and
/// the recording stack.
pub struct Scheduler {
    graph: Mutex<DepGraph>,
    txn: Mutex<TxnState>,
    spy: Mutex<SpyStack>,
    run_depth: AtomicUsize,
    learning: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            graph: Mutex::new(DepGraph::new()),
            txn: Mutex::new(TxnState::default()),
            spy: Mutex::new(SpyStack::default()),
            run_depth: AtomicUsize::new(0),
            learning: AtomicBool::new(false),
        })
    }

    /// Run `f` with writes unlocked. Transactions nest; only the outermost
    /// exit commits. If `f` panics the transaction closes without
    /// committing and buffered work waits for the next commit.
    pub fn transaction<R>(self: &Arc<Self>, f: impl FnOnce() -> R) -> R {
        let outermost = {
            let mut txn = self.txn.lock();
            txn.depth += 1;
            txn.open = true;
            txn.depth == 1
        };
        let guard = DepthGuard(self.clone());
        let result = f();
        drop(guard);
        if outermost {
            self.commit();
        }
        result
    }

    /// Whether a transaction is currently open.
    pub fn is_open(&self) -> bool {
        self.txn.lock().open
    }

    /// Whether the commit's learning phase is rerunning reactors.
    pub fn is_learning(&self) -> bool {
        self.learning.load(Ordering::SeqCst)
    }

    /// Whether any reactor body is currently on the stack.
    pub fn is_running(&self) -> bool {
        self.run_depth.load(Ordering::SeqCst) > 0
    }

    /// Whether reads are currently being recorded.
    pub fn is_spying(&self) -> bool {
        self.spy.lock().is_active()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), ReactiveError> {
        if self.txn.lock().open {
            Ok(())
        } else {
            Err(ReactiveError::LockedState)
        }
    }

    pub(crate) fn register_updated(&self, node: &Arc<Node>) {
        let mut txn = self.txn.lock();
        if txn.updated.iter().all(|n| n.id() != node.id()) {
            txn.updated.push(node.clone());
        }
    }

    pub(crate) fn record_read(&self, node: NodeId, path: String) {
        self.spy.lock().record(Address { node, path });
    }

    /// Open a recording frame for `reactor`; reads report to it until the
    /// matching [`stop_session`](Self::stop_session).
    pub fn start_session(&self, reactor: ReactorId) {
        self.spy.lock().start(reactor);
    }

    /// Close the recording frame and return the addresses it captured.
    pub fn stop_session(&self, reactor: ReactorId) -> SmallVec<[Address; 4]> {
        self.spy.lock().stop(reactor)
    }

    /// Suppress recording until [`resume_spying`](Self::resume_spying).
    /// Used while syncing derived output nodes, whose internal writes are
    /// not dependencies of anything.
    pub fn pause_spying(&self) {
        self.spy.lock().pause();
    }

    pub fn resume_spying(&self) {
        self.spy.lock().resume();
    }

    /// Add a reactor to the dependency graph.
    pub fn register_reactor(&self, reactor: Arc<dyn Reactor>) {
        let id = reactor.id();
        trace!(reactor = id.raw(), "reactor registered");
        self.graph.lock().register(reactor);
        let mut txn = self.txn.lock();
        if txn.open {
            txn.awoken.push(id);
        }
    }

    pub(crate) fn replace_deps(
        &self,
        id: ReactorId,
        deps: SmallVec<[Address; 4]>,
    ) -> Result<(), ReactiveError> {
        self.graph.lock().replace_deps(id, deps)
    }

    /// Retire a reactor, pruning derived values it used exclusively.
    pub fn dispose_reactor(&self, id: ReactorId) {
        self.graph.lock().dispose(id);
    }

    pub(crate) fn run_guard(self: &Arc<Self>) -> RunGuard {
        self.run_depth.fetch_add(1, Ordering::SeqCst);
        RunGuard(self.clone())
    }

    fn commit(self: &Arc<Self>) {
        let (updated, awoken) = {
            let mut txn = self.txn.lock();
            (
                std::mem::take(&mut txn.updated),
                std::mem::take(&mut txn.awoken),
            )
        };
        if updated.is_empty() && awoken.is_empty() {
            return;
        }

        // Resolve the rerun order before draining anything.
        let mut order: Vec<ReactorId> = Vec::new();
        {
            let graph = self.graph.lock();
            for node in &updated {
                for id in graph.targets(node.id()) {
                    if !order.contains(&id) {
                        order.push(id);
                    }
                }
            }
            for id in &order {
                if let Some(reactor) = graph.reactor(*id) {
                    reactor.mark_stale();
                }
            }
        }
        // Reactors that appeared mid-transaction join the pass unmarked;
        // run_if_stale no-ops unless a dependency actually changed.
        for id in awoken {
            if !order.contains(&id) {
                order.push(id);
            }
        }
        debug!(updated = updated.len(), reactors = order.len(), "commit");

        // Drain patches and notify observers, once per distinct root.
        let mut drained: Vec<u64> = Vec::new();
        for node in &updated {
            let root = node.root();
            if !drained.contains(&root.id().raw()) {
                drained.push(root.id().raw());
                let patch = root.transaction_ended();
                trace!(
                    root = root.id().raw(),
                    ops = patch.forward.len(),
                    "patch drained"
                );
            }
        }

        // Learning phase. The graph lock is released before each body runs,
        // so reactors are free to read, create, and dispose. The guard
        // clears the flag even if a body panics.
        self.learning.store(true, Ordering::SeqCst);
        let _learning = LearnGuard(self.clone());
        for id in &order {
            let reactor = self.graph.lock().reactor(*id);
            if let Some(reactor) = reactor {
                reactor.run_if_stale();
            }
        }
    }

    /// Register and immediately run an eager reactor.
    ///
    /// The returned handle doubles as the disposer: call
    /// [`dispose`](super::Reaction::dispose) to retire it.
    pub fn create_reaction<F>(self: &Arc<Self>, body: F) -> Arc<super::Reaction>
    where
        F: Fn() + Send + Sync + 'static,
    {
        super::Reaction::new(self, body)
    }

    /// Create a dormant memoized value; read it with
    /// [`DerivedValue::get`](super::DerivedValue::get).
    pub fn create_derived<F>(self: &Arc<Self>, producer: F) -> Arc<super::DerivedValue>
    where
        F: Fn() -> serde_json::Value + Send + Sync + 'static,
    {
        super::DerivedValue::new(self, producer)
    }
}

struct DepthGuard(Arc<Scheduler>);

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let mut txn = self.0.txn.lock();
        txn.depth -= 1;
        if txn.depth == 0 {
            txn.open = false;
        }
    }
}

struct LearnGuard(Arc<Scheduler>);

impl Drop for LearnGuard {
    fn drop(&mut self) {
        self.0.learning.store(false, Ordering::SeqCst);
    }
}

pub(crate) struct RunGuard(Arc<Scheduler>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.run_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII recording session used by reactor bodies.
///
/// `finish` returns the recorded addresses. If the body panics and the
/// session is dropped unfinished, the frame is discarded and the reactor
/// keeps its previous dependency list.
pub(crate) struct SpySession {
    scheduler: Arc<Scheduler>,
    reactor: ReactorId,
    finished: bool,
}

impl SpySession {
    pub fn begin(scheduler: &Arc<Scheduler>, reactor: ReactorId) -> Self {
        scheduler.start_session(reactor);
        Self {
            scheduler: scheduler.clone(),
            reactor,
            finished: false,
        }
    }

    pub fn finish(mut self) -> SmallVec<[Address; 4]> {
        self.finished = true;
        self.scheduler.stop_session(self.reactor)
    }
}

impl Drop for SpySession {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.scheduler.stop_session(self.reactor);
        }
    }
}
