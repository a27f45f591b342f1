//! Dependency graph between observable state and reactive computations.
//!
//! The graph knows, for every live reactor, which addresses it read on its
//! last run. Given a changed node it answers which reactors are affected,
//! chasing chains through derived values, and it garbage-collects derived
//! values that lose their last consumer.

pub mod dep_graph;

pub use dep_graph::DepGraph;

use std::sync::Arc;

use crate::id::ReactorId;

/// Scheduling class of a reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorKind {
    /// Eager: reruns during the learning phase whenever a dependency changed.
    Reaction,
    /// Lazy: recomputes only when read while stale; its output node shares
    /// the reactor's id.
    Derived,
}

/// A unit of reactive computation tracked by the dependency graph.
pub trait Reactor: Send + Sync {
    fn id(&self) -> ReactorId;

    fn kind(&self) -> ReactorKind;

    fn is_stale(&self) -> bool;

    /// Flag the reactor as needing a rerun before its output can be trusted.
    fn mark_stale(&self);

    /// Rerun the body if the reactor is stale and not disposed.
    fn run_if_stale(self: Arc<Self>);

    /// Permanently retire the reactor; it never runs again.
    fn mark_disposed(&self);
}
