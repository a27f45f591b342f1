//! Observable state storage: schemas, nodes, and structural patches.

pub mod node;
pub mod patch;
pub mod schema;

pub use node::{Node, ReadValue};
pub use patch::{apply, Patch, PatchOp};
pub use schema::Schema;
