//! Reactors and scheduling.
//!
//! # How It Works
//!
//! The [`Scheduler`] is the shared context: it owns the transaction state,
//! the dependency graph, and the spy stack that records which addresses a
//! running reactor reads. Two reactor flavors sit on top of it:
//!
//! - [`Reaction`]: eager; runs at creation and reruns after any commit
//!   that touched a dependency.
//! - [`DerivedValue`]: lazy and memoized; recomputes on read only when a
//!   dependency changed, and exposes its output as an observable node so
//!   other reactors can depend on it.

pub mod derived;
pub mod reaction;
pub mod scheduler;
pub mod spy;

pub use derived::DerivedValue;
pub use reaction::Reaction;
pub use scheduler::Scheduler;
pub use spy::Address;
