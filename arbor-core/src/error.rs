//! Error taxonomy for the reactivity engine.

use thiserror::Error;

use crate::id::ReactorId;

/// Errors surfaced by the observable store and the scheduler.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A write was attempted while no transaction was open.
    #[error("state is locked: writes require an open transaction")]
    LockedState,

    /// A written value was rejected by the node's declared schema.
    ///
    /// Invalid writes are always surfaced as a recoverable error; the
    /// enclosing transaction stays open and other mutations proceed.
    #[error("value rejected by schema at {path:?}")]
    InvalidValue { path: String },

    /// A read or write addressed a key the node does not have.
    #[error("unknown key {key:?} at {path:?}")]
    UnknownKey { path: String, key: String },

    /// The dependency graph referenced a reactor that is not in the table.
    ///
    /// This is an internal-consistency bug, not a user error.
    #[error("unknown reactor {id:?} referenced by dependency graph")]
    UnknownDependency { id: ReactorId },

    /// A patch op could not be applied to the given document.
    #[error("patch op does not apply at {path:?}")]
    BadPatch { path: String },
}
