//! Arbor Core
//!
//! Fine-grained incremental reactivity over an observable tree store.
//! It implements:
//!
//! - Schema-validated observable nodes (records, lists, maps, variants)
//! - Transactions that emit reversible JSON-Patch style diffs
//! - A dependency-tracking scheduler that reruns exactly the computations
//!   affected by a change
//! - Eager reactions and lazy, memoized derived values
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: observable nodes, schemas, and patch emission
//! - `reactive`: the scheduler, spy stack, reactions, and derived values
//! - `graph`: the dependency graph between state and reactors
//! - `id`: shared identity space for nodes and reactors
//!
//! # Example
//!
//! ```rust
//! use arbor_core::{Node, Reaction, Scheduler, Schema};
//! use serde_json::json;
//!
//! let scheduler = Scheduler::new();
//! let player = Node::tree(
//!     &scheduler,
//!     Schema::record([("health", Schema::Number)]),
//!     json!({"health": 100}),
//! )
//! .unwrap();
//!
//! // Runs now, and again after every commit that changes `health`.
//! let observed = player.clone();
//! let _watcher = Reaction::new(&scheduler, move || {
//!     let _ = observed.get("health");
//! });
//!
//! scheduler.transaction(|| {
//!     player.write("health", json!(90)).unwrap();
//! });
//! ```

pub mod error;
pub mod graph;
pub mod id;
pub mod reactive;
pub mod store;

pub use error::ReactiveError;
pub use graph::{Reactor, ReactorKind};
pub use id::{NodeId, ReactorId};
pub use reactive::{Address, DerivedValue, Reaction, Scheduler};
pub use store::{Node, Patch, PatchOp, ReadValue, Schema};
