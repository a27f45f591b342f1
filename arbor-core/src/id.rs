//! Identifiers for observable nodes and reactors.
//!
//! Both id kinds are drawn from one process-wide counter. Sharing the
//! counter matters: a derived value's backing node is addressed by the
//! reactor's own id, so the two namespaces must never collide.

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_raw_id() -> u64 {
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for an observable node.
///
/// Assigned at construction and never reassigned; it survives re-parenting
/// and structural replacement of the node's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        Self(next_raw_id())
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a reactor (reaction or derived value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReactorId(u64);

impl ReactorId {
    /// Generate a new unique reactor ID.
    pub fn new() -> Self {
        Self(next_raw_id())
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// View this reactor id as a node id.
    ///
    /// Used for the backing node of a derived value, which shares the
    /// reactor's identity so it is independently addressable.
    pub fn as_node(&self) -> NodeId {
        NodeId(self.0)
    }
}

impl Default for ReactorId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn reactor_and_node_ids_share_a_namespace() {
        let n = NodeId::new();
        let r = ReactorId::new();
        assert_ne!(n.raw(), r.raw());
        assert_eq!(r.as_node().raw(), r.raw());
    }
}
