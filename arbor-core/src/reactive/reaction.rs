//! Eager reactors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::graph::{Reactor, ReactorKind};
use crate::id::ReactorId;

use super::scheduler::{Scheduler, SpySession};

/// An eager reactor: runs its body once at creation to learn its
/// dependencies, then reruns during the learning phase of any commit that
/// touched one of them.
pub struct Reaction {
    id: ReactorId,
    scheduler: Arc<Scheduler>,
    body: Box<dyn Fn() + Send + Sync>,
    stale: AtomicBool,
    disposed: AtomicBool,
}

impl Reaction {
    /// Register a new reaction and run it immediately.
    pub fn new<F>(scheduler: &Arc<Scheduler>, body: F) -> Arc<Reaction>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let reaction = Arc::new(Reaction {
            id: ReactorId::new(),
            scheduler: scheduler.clone(),
            body: Box::new(body),
            stale: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        });
        scheduler.register_reactor(reaction.clone());
        reaction.clone().run();
        reaction
    }

    pub fn id(&self) -> ReactorId {
        self.id
    }

    fn run(self: Arc<Self>) {
        let _running = self.scheduler.run_guard();
        let session = SpySession::begin(&self.scheduler, self.id);
        (self.body)();
        let deps = session.finish();
        trace!(reactor = self.id.raw(), deps = deps.len(), "reaction ran");
        if self.scheduler.replace_deps(self.id, deps).is_ok() {
            self.stale.store(false, Ordering::SeqCst);
        }
    }

    /// Permanently retire this reaction. Derived values it was the last
    /// consumer of are retired with it.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.scheduler.dispose_reactor(self.id);
    }
}

impl Reactor for Reaction {
    fn id(&self) -> ReactorId {
        self.id
    }

    fn kind(&self) -> ReactorKind {
        ReactorKind::Reaction
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
        if self.disposed.load(Ordering::SeqCst) || !self.stale.load(Ordering::SeqCst) {
            return;
        }
        self.run();
    }

    fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Node, Schema};
    use serde_json::json;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn runs_at_creation_and_on_dependency_change() {
        let s = Scheduler::new();
        let root = Node::tree(&s, Schema::record([("n", Schema::Number)]), json!({"n": 0}))
            .unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let _reaction = {
            let root = root.clone();
            let runs = runs.clone();
            Reaction::new(&s, move || {
                let _ = root.get("n");
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        s.transaction(|| {
            root.write("n", json!(1)).unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unrelated_writes_do_not_rerun() {
        let s = Scheduler::new();
        let root = Node::tree(
            &s,
            Schema::record([("a", Schema::Number), ("b", Schema::Number)]),
            json!({"a": 0, "b": 0}),
        )
        .unwrap();
        let other = Node::tree(&s, Schema::record([("x", Schema::Number)]), json!({"x": 0}))
            .unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let _reaction = {
            let root = root.clone();
            let runs = runs.clone();
            Reaction::new(&s, move || {
                let _ = root.get("a");
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        // A different tree entirely.
        s.transaction(|| {
            other.write("x", json!(5)).unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Same root: node-granular matching reruns the reaction even for
        // the sibling field.
        s.transaction(|| {
            root.write("b", json!(5)).unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disposed_reaction_never_reruns() {
        let s = Scheduler::new();
        let root = Node::tree(&s, Schema::record([("n", Schema::Number)]), json!({"n": 0}))
            .unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let reaction = {
            let root = root.clone();
            let runs = runs.clone();
            Reaction::new(&s, move || {
                let _ = root.get("n");
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };
        reaction.dispose();

        s.transaction(|| {
            root.write("n", json!(1)).unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dependencies_follow_the_last_run() {
        let s = Scheduler::new();
        let root = Node::tree(
            &s,
            Schema::record([("which", Schema::Bool), ("a", Schema::Number)]),
            json!({"which": true, "a": 0}),
        )
        .unwrap();
        let other = Node::tree(&s, Schema::record([("b", Schema::Number)]), json!({"b": 0}))
            .unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let _reaction = {
            let root = root.clone();
            let other = other.clone();
            let runs = runs.clone();
            Reaction::new(&s, move || {
                runs.fetch_add(1, Ordering::SeqCst);
                if root.get("which").unwrap() == json!(true) {
                    let _ = root.get("a");
                } else {
                    let _ = other.get("b");
                }
            })
        };
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Flip the branch: the reaction now reads `other` instead.
        s.transaction(|| {
            root.write("which", json!(false)).unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        s.transaction(|| {
            other.write("b", json!(1)).unwrap();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
