//! Observable Node
//!
//! A `Node` is an addressable unit of mutable state: a leaf value or a
//! composite (record, list, map, variant) that owns child nodes. Nodes form
//! a tree; the root of each tree carries the patch buffer for the whole
//! tree, and every mutation inside a transaction appends a forward op and
//! its inverse there.
//!
//! # Identity and paths
//!
//! A node's id is assigned at construction and never changes, even when the
//! node's entire content is replaced (a variant rebinding to a different
//! candidate shape keeps its id). Paths are derived on demand by walking the
//! parent chain, so list index shifts are always reflected.
//!
//! # Tracking
//!
//! `read` reports the touched address to the scheduler's spy stack; every
//! other accessor (`snapshot` in particular) stays off the tracked path so
//! internal bookkeeping reads never become dependencies.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map as JsonMap, Value};
use tracing::trace;

use crate::error::ReactiveError;
use crate::id::NodeId;
use crate::reactive::Scheduler;

use super::patch::{escape_segment, Patch, PatchOp};
use super::schema::Schema;

/// Result of a tracked read: the unwrapped value for a leaf child, or the
/// child node itself for a composite.
#[derive(Clone, Debug)]
pub enum ReadValue {
    /// The child is a leaf; its value is returned directly.
    Leaf(Value),
    /// The child is a composite; the handle allows further tracked reads.
    Node(Arc<Node>),
}

impl ReadValue {
    /// Materialize the read as a plain value (snapshots composites).
    pub fn into_value(self) -> Value {
        match self {
            ReadValue::Leaf(v) => v,
            ReadValue::Node(n) => n.snapshot(),
        }
    }

    /// The child node, if the read hit a composite.
    pub fn as_node(&self) -> Option<&Arc<Node>> {
        match self {
            ReadValue::Node(n) => Some(n),
            ReadValue::Leaf(_) => None,
        }
    }
}

enum Content {
    Leaf(Value),
    Record(IndexMap<String, Arc<Node>>),
    List(Vec<Arc<Node>>),
    Map(IndexMap<String, Arc<Node>>),
}

struct NodeInner {
    parent: Option<Weak<Node>>,
    content: Content,
    /// For variants: index of the currently bound candidate schema.
    bound: Option<usize>,
    /// Root-only: forward ops in emission order.
    forward: Vec<PatchOp>,
    /// Root-only: inverse ops in emission order (reversed on drain).
    inverse: Vec<PatchOp>,
    /// Root-only: called with the drained patch at transaction end.
    observer: Option<Arc<dyn Fn(&Patch) + Send + Sync>>,
}

/// A mutable, observable container participating in dependency tracking
/// and patch emission.
pub struct Node {
    id: NodeId,
    schema: Schema,
    scheduler: Arc<Scheduler>,
    inner: Mutex<NodeInner>,
}

impl Node {
    /// Build an observable tree from a schema and an initial value.
    pub fn tree(
        scheduler: &Arc<Scheduler>,
        schema: Schema,
        value: Value,
    ) -> Result<Arc<Node>, ReactiveError> {
        if !schema.accepts(&value) {
            return Err(ReactiveError::InvalidValue {
                path: String::new(),
            });
        }
        Ok(Self::build(scheduler, schema, value, None, NodeId::new()))
    }

    /// Build a tree with a caller-chosen id. Used for derived-value backing
    /// nodes, which share the reactor's id.
    pub(crate) fn tree_with_id(
        scheduler: &Arc<Scheduler>,
        schema: Schema,
        value: Value,
        id: NodeId,
    ) -> Arc<Node> {
        Self::build(scheduler, schema, value, None, id)
    }

    fn build(
        scheduler: &Arc<Scheduler>,
        schema: Schema,
        value: Value,
        parent: Option<Weak<Node>>,
        id: NodeId,
    ) -> Arc<Node> {
        let node = Arc::new(Node {
            id,
            schema,
            scheduler: scheduler.clone(),
            inner: Mutex::new(NodeInner {
                parent,
                content: Content::Leaf(Value::Null),
                bound: None,
                forward: Vec::new(),
                inverse: Vec::new(),
                observer: None,
            }),
        });
        let (content, bound) = Self::content_for(&node, &node.schema.clone(), value);
        {
            let mut inner = node.inner.lock();
            inner.content = content;
            inner.bound = bound;
        }
        node
    }

    /// Build content for `owner` from an already-validated value.
    fn content_for(owner: &Arc<Node>, schema: &Schema, value: Value) -> (Content, Option<usize>) {
        let child = |schema: Schema, value: Value| {
            Self::build(
                &owner.scheduler,
                schema,
                value,
                Some(Arc::downgrade(owner)),
                NodeId::new(),
            )
        };
        match schema {
            Schema::Bool | Schema::Number | Schema::String => (Content::Leaf(value), None),
            Schema::Any => match value {
                Value::Object(map) => (
                    Content::Map(
                        map.into_iter()
                            .map(|(k, v)| (k, child(Schema::Any, v)))
                            .collect(),
                    ),
                    None,
                ),
                Value::Array(items) => (
                    Content::List(items.into_iter().map(|v| child(Schema::Any, v)).collect()),
                    None,
                ),
                other => (Content::Leaf(other), None),
            },
            Schema::Record(fields) => {
                let mut map = match value {
                    Value::Object(map) => map,
                    _ => JsonMap::new(),
                };
                let children = fields
                    .iter()
                    .map(|(k, s)| {
                        let v = map
                            .remove(k)
                            .expect("record field present after validation");
                        (k.clone(), child(s.clone(), v))
                    })
                    .collect();
                (Content::Record(children), None)
            }
            Schema::List(elem) => {
                let items = match value {
                    Value::Array(items) => items,
                    _ => Vec::new(),
                };
                (
                    Content::List(
                        items
                            .into_iter()
                            .map(|v| child((**elem).clone(), v))
                            .collect(),
                    ),
                    None,
                )
            }
            Schema::Map(elem) => {
                let map = match value {
                    Value::Object(map) => map,
                    _ => JsonMap::new(),
                };
                (
                    Content::Map(
                        map.into_iter()
                            .map(|(k, v)| (k, child((**elem).clone(), v)))
                            .collect(),
                    ),
                    None,
                )
            }
            Schema::Variant(_) => {
                let (idx, candidate) = schema
                    .candidate_for(&value)
                    .expect("validated value has a matching candidate");
                let (content, _) = Self::content_for(owner, &candidate.clone(), value);
                (content, Some(idx))
            }
        }
    }

    /// The node's stable identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node's declared type.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// For variants: index of the currently bound candidate.
    pub fn bound_candidate(&self) -> Option<usize> {
        self.inner.lock().bound
    }

    fn parent(&self) -> Option<Arc<Node>> {
        self.inner.lock().parent.as_ref().and_then(|w| w.upgrade())
    }

    /// The key under which `child` currently sits, if it is attached here.
    fn key_of(&self, child: NodeId) -> Option<String> {
        let inner = self.inner.lock();
        match &inner.content {
            Content::Leaf(_) => None,
            Content::Record(m) | Content::Map(m) => m
                .iter()
                .find(|(_, n)| n.id == child)
                .map(|(k, _)| k.clone()),
            Content::List(items) => items
                .iter()
                .position(|n| n.id == child)
                .map(|i| i.to_string()),
        }
    }

    /// The node's path relative to its tree root (root path is empty).
    ///
    /// Computed on demand from the parent chain; a node no longer attached
    /// to its parent is treated as a root of its own subtree.
    pub fn path(&self) -> String {
        let mut segments: Vec<String> = Vec::new();
        let mut cur_id = self.id;
        let mut parent = self.parent();
        while let Some(p) = parent {
            match p.key_of(cur_id) {
                Some(key) => {
                    segments.push(escape_segment(&key));
                    cur_id = p.id;
                    parent = p.parent();
                }
                None => break,
            }
        }
        let mut out = String::new();
        for seg in segments.iter().rev() {
            out.push('/');
            out.push_str(seg);
        }
        out
    }

    /// The root of this node's ownership tree (possibly the node itself).
    pub fn root(self: &Arc<Self>) -> Arc<Node> {
        let mut cur = self.clone();
        loop {
            let next = cur
                .parent()
                .filter(|p| p.key_of(cur.id).is_some());
            match next {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    fn child_node(&self, key: &str) -> Option<Arc<Node>> {
        let inner = self.inner.lock();
        match &inner.content {
            Content::Leaf(_) => None,
            Content::Record(m) | Content::Map(m) => m.get(key).cloned(),
            Content::List(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned()),
        }
    }

    fn unknown_key(&self, key: &str) -> ReactiveError {
        ReactiveError::UnknownKey {
            path: self.path(),
            key: key.to_string(),
        }
    }

    fn child_path(&self, key: &str) -> String {
        format!("{}/{}", self.path(), escape_segment(key))
    }

    /// Tracked read of a child.
    ///
    /// Records `id + path + "/" + key` with the scheduler's spy stack (if a
    /// session is active and recording is not paused), then returns the
    /// unwrapped value for a leaf child or the node handle for a composite.
    pub fn read(self: &Arc<Self>, key: &str) -> Result<ReadValue, ReactiveError> {
        let child = self
            .child_node(key)
            .ok_or_else(|| self.unknown_key(key))?;
        self.scheduler.record_read(self.id, self.child_path(key));
        let leaf = {
            let inner = child.inner.lock();
            match &inner.content {
                Content::Leaf(v) => Some(v.clone()),
                _ => None,
            }
        };
        Ok(match leaf {
            Some(v) => ReadValue::Leaf(v),
            None => ReadValue::Node(child),
        })
    }

    /// Tracked read returning a plain value (snapshots composite children).
    pub fn get(self: &Arc<Self>, key: &str) -> Result<Value, ReactiveError> {
        Ok(self.read(key)?.into_value())
    }

    /// Recursively materialize a plain value tree.
    ///
    /// Untracked: never reports to the spy stack.
    pub fn snapshot(&self) -> Value {
        let inner = self.inner.lock();
        match &inner.content {
            Content::Leaf(v) => v.clone(),
            Content::Record(m) | Content::Map(m) => {
                let mut out = JsonMap::new();
                for (k, n) in m {
                    out.insert(k.clone(), n.snapshot());
                }
                Value::Object(out)
            }
            Content::List(items) => Value::Array(items.iter().map(|n| n.snapshot()).collect()),
        }
    }

    /// Write a child value.
    ///
    /// Requires an open transaction. The value is validated against the
    /// child's declared type; a rejected value is surfaced as
    /// [`ReactiveError::InvalidValue`] without touching storage. On maps an
    /// unknown key inserts a new entry; everywhere else it is an error.
    pub fn write(self: &Arc<Self>, key: &str, value: Value) -> Result<(), ReactiveError> {
        self.scheduler.ensure_open()?;
        if let Some(child) = self.child_node(key) {
            if !child.schema.accepts(&value) {
                return Err(ReactiveError::InvalidValue {
                    path: self.child_path(key),
                });
            }
            // Variants always rebind so the bound candidate stays accurate.
            let plain_leaf = !value.is_object()
                && !value.is_array()
                && !matches!(child.schema, Schema::Variant(_));
            if plain_leaf {
                if let Some(old) = child.try_set_leaf(value.clone()) {
                    let path = self.child_path(key);
                    trace!(node = self.id.raw(), %path, "leaf write");
                    self.add_patch(
                        PatchOp::Replace {
                            path: path.clone(),
                            value,
                        },
                        PatchOp::Replace { path, value: old },
                    );
                    self.scheduler.register_updated(self);
                    return Ok(());
                }
            }
            // Structural replacement of an existing child; the child keeps
            // its id and registers itself as updated.
            return child.rebind(value);
        }
        // No such child: maps accept new keys, everything else fails.
        let elem = self
            .map_value_schema()
            .ok_or_else(|| self.unknown_key(key))?;
        if !elem.accepts(&value) {
            return Err(ReactiveError::InvalidValue {
                path: self.child_path(key),
            });
        }
        let child = Self::build(
            &self.scheduler,
            elem,
            value.clone(),
            Some(Arc::downgrade(self)),
            NodeId::new(),
        );
        let inserted = {
            let mut inner = self.inner.lock();
            match &mut inner.content {
                Content::Map(m) => {
                    m.insert(key.to_string(), child);
                    true
                }
                _ => false,
            }
        };
        if !inserted {
            return Err(self.unknown_key(key));
        }
        let path = self.child_path(key);
        trace!(node = self.id.raw(), %path, "map insert");
        self.add_patch(
            PatchOp::Add {
                path: path.clone(),
                value,
            },
            PatchOp::Remove { path },
        );
        self.scheduler.register_updated(self);
        Ok(())
    }

    /// Remove a map entry or list element.
    pub fn remove(self: &Arc<Self>, key: &str) -> Result<(), ReactiveError> {
        self.scheduler.ensure_open()?;
        let path = self.child_path(key);
        let removed = {
            let mut inner = self.inner.lock();
            match &mut inner.content {
                Content::Map(m) => m.shift_remove(key),
                Content::List(items) => key
                    .parse::<usize>()
                    .ok()
                    .filter(|i| *i < items.len())
                    .map(|i| items.remove(i)),
                _ => {
                    return Err(ReactiveError::InvalidValue { path });
                }
            }
        };
        let removed = removed.ok_or_else(|| self.unknown_key(key))?;
        let old = removed.snapshot();
        trace!(node = self.id.raw(), %path, "remove");
        self.add_patch(
            PatchOp::Remove { path: path.clone() },
            PatchOp::Add { path, value: old },
        );
        self.scheduler.register_updated(self);
        Ok(())
    }

    /// Append a list element.
    pub fn push(self: &Arc<Self>, value: Value) -> Result<(), ReactiveError> {
        let len = {
            let inner = self.inner.lock();
            match &inner.content {
                Content::List(items) => items.len(),
                _ => {
                    drop(inner);
                    return Err(ReactiveError::InvalidValue { path: self.path() });
                }
            }
        };
        self.insert(len, value)
    }

    /// Insert a list element at `index`, shifting later siblings right.
    pub fn insert(self: &Arc<Self>, index: usize, value: Value) -> Result<(), ReactiveError> {
        self.scheduler.ensure_open()?;
        let elem = self
            .element_schema()
            .ok_or_else(|| ReactiveError::InvalidValue { path: self.path() })?;
        if !elem.accepts(&value) {
            return Err(ReactiveError::InvalidValue {
                path: self.child_path(&index.to_string()),
            });
        }
        let child = Self::build(
            &self.scheduler,
            elem,
            value.clone(),
            Some(Arc::downgrade(self)),
            NodeId::new(),
        );
        let inserted = {
            let mut inner = self.inner.lock();
            match &mut inner.content {
                Content::List(items) if index <= items.len() => {
                    items.insert(index, child);
                    true
                }
                _ => false,
            }
        };
        if !inserted {
            return Err(self.unknown_key(&index.to_string()));
        }
        let path = self.child_path(&index.to_string());
        trace!(node = self.id.raw(), %path, "list insert");
        self.add_patch(
            PatchOp::Add {
                path: path.clone(),
                value,
            },
            PatchOp::Remove { path },
        );
        self.scheduler.register_updated(self);
        Ok(())
    }

    /// Reorder a list element, emitting a single `move` op.
    pub fn move_entry(self: &Arc<Self>, from: usize, to: usize) -> Result<(), ReactiveError> {
        self.scheduler.ensure_open()?;
        if from == to {
            return Ok(());
        }
        let moved = {
            let mut inner = self.inner.lock();
            match &mut inner.content {
                Content::List(items) if from < items.len() && to < items.len() => {
                    let node = items.remove(from);
                    items.insert(to, node);
                    Some(true)
                }
                Content::List(_) => Some(false),
                _ => None,
            }
        };
        match moved {
            Some(true) => {}
            Some(false) => return Err(self.unknown_key(&from.max(to).to_string())),
            None => return Err(ReactiveError::InvalidValue { path: self.path() }),
        }
        let from_path = self.child_path(&from.to_string());
        let to_path = self.child_path(&to.to_string());
        trace!(node = self.id.raw(), %from_path, %to_path, "list move");
        self.add_patch(
            PatchOp::Move {
                from: from_path.clone(),
                path: to_path.clone(),
            },
            PatchOp::Move {
                from: to_path,
                path: from_path,
            },
        );
        self.scheduler.register_updated(self);
        Ok(())
    }

    /// Replace this node's whole content.
    ///
    /// For variants this is the rebinding entry point: the bound concrete
    /// content is torn down and rebuilt for whichever candidate accepts the
    /// new value, while the node's id is preserved.
    pub fn set_value(self: &Arc<Self>, value: Value) -> Result<(), ReactiveError> {
        self.scheduler.ensure_open()?;
        self.rebind(value)
    }

    fn rebind(self: &Arc<Self>, value: Value) -> Result<(), ReactiveError> {
        if !self.schema.accepts(&value) {
            return Err(ReactiveError::InvalidValue { path: self.path() });
        }
        let old = self.snapshot();
        let path = self.path();
        self.replace_content(value.clone());
        trace!(node = self.id.raw(), %path, "rebind");
        self.add_patch(
            PatchOp::Replace {
                path: path.clone(),
                value,
            },
            PatchOp::Replace { path, value: old },
        );
        self.scheduler.register_updated(self);
        Ok(())
    }

    /// Backing-node write path for derived values: replaces content without
    /// the transaction guard, patch emission, or updated-registration.
    pub(crate) fn sync_value(self: &Arc<Self>, value: Value) {
        self.replace_content(value);
    }

    fn replace_content(self: &Arc<Self>, value: Value) {
        let (content, bound) = Self::content_for(self, &self.schema.clone(), value);
        let mut inner = self.inner.lock();
        inner.content = content;
        inner.bound = bound;
    }

    fn try_set_leaf(&self, value: Value) -> Option<Value> {
        let mut inner = self.inner.lock();
        match &mut inner.content {
            Content::Leaf(v) => Some(std::mem::replace(v, value)),
            _ => None,
        }
    }

    fn element_schema(&self) -> Option<Schema> {
        match &self.schema {
            Schema::List(e) => Some((**e).clone()),
            Schema::Any => Some(Schema::Any),
            Schema::Variant(candidates) => {
                let bound = self.inner.lock().bound?;
                match candidates.get(bound)? {
                    Schema::List(e) => Some((**e).clone()),
                    Schema::Any => Some(Schema::Any),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn map_value_schema(&self) -> Option<Schema> {
        match &self.schema {
            Schema::Map(e) => Some((**e).clone()),
            Schema::Any => Some(Schema::Any),
            Schema::Variant(candidates) => {
                let bound = self.inner.lock().bound?;
                match candidates.get(bound)? {
                    Schema::Map(e) => Some((**e).clone()),
                    Schema::Any => Some(Schema::Any),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Append a forward/inverse op pair to the owning root's patch buffer.
    ///
    /// Mutating operations call this themselves; it is public so layers
    /// built on top can record synthesized ops alongside primary writes.
    pub fn add_patch(self: &Arc<Self>, forward: PatchOp, inverse: PatchOp) {
        let root = self.root();
        let mut inner = root.inner.lock();
        inner.forward.push(forward);
        inner.inverse.push(inverse);
    }

    /// Register a callback invoked with the drained patch at the end of any
    /// transaction that touched this root.
    pub fn on_transaction_end<F>(&self, observer: F)
    where
        F: Fn(&Patch) + Send + Sync + 'static,
    {
        self.inner.lock().observer = Some(Arc::new(observer));
    }

    /// Drain the patch buffer, invoking the observer if the transaction
    /// touched this root. Called by the scheduler at commit, before the
    /// learning phase reruns anything.
    pub fn transaction_ended(&self) -> Patch {
        let (patch, observer) = {
            let mut inner = self.inner.lock();
            let forward = std::mem::take(&mut inner.forward);
            let mut backward = std::mem::take(&mut inner.inverse);
            backward.reverse();
            (Patch { forward, backward }, inner.observer.clone())
        };
        if let Some(observer) = observer {
            if !patch.is_empty() {
                observer(&patch);
            }
        }
        patch
    }

    /// A copy of the ops buffered so far in the open transaction.
    pub fn pending_patch(&self) -> Patch {
        let inner = self.inner.lock();
        let mut backward = inner.inverse.clone();
        backward.reverse();
        Patch {
            forward: inner.forward.clone(),
            backward,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("path", &self.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::patch;
    use serde_json::json;

    fn scheduler() -> Arc<Scheduler> {
        Scheduler::new()
    }

    fn player_schema() -> Schema {
        Schema::record([
            ("name", Schema::String),
            (
                "stats",
                Schema::record([("health", Schema::Number)]),
            ),
        ])
    }

    fn player_value() -> Value {
        json!({"name": "ada", "stats": {"health": 100}})
    }

    #[test]
    fn tree_builds_and_snapshots() {
        let s = scheduler();
        let root = Node::tree(&s, player_schema(), player_value()).unwrap();
        assert_eq!(root.snapshot(), player_value());
        assert_eq!(root.path(), "");
    }

    #[test]
    fn tree_rejects_mismatched_value() {
        let s = scheduler();
        let err = Node::tree(&s, player_schema(), json!({"name": 5})).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidValue { .. }));
    }

    #[test]
    fn write_outside_transaction_is_locked() {
        let s = scheduler();
        let root = Node::tree(&s, player_schema(), player_value()).unwrap();
        let err = root.write("name", json!("grace")).unwrap_err();
        assert!(matches!(err, ReactiveError::LockedState));
    }

    #[test]
    fn leaf_write_updates_and_emits_patch() {
        let s = scheduler();
        let root = Node::tree(&s, player_schema(), player_value()).unwrap();
        s.transaction(|| {
            root.write("name", json!("grace")).unwrap();
            let patch = root.pending_patch();
            assert_eq!(
                patch.forward,
                vec![PatchOp::Replace {
                    path: "/name".into(),
                    value: json!("grace"),
                }]
            );
            assert_eq!(
                patch.backward,
                vec![PatchOp::Replace {
                    path: "/name".into(),
                    value: json!("ada"),
                }]
            );
        });
        assert_eq!(root.snapshot()["name"], json!("grace"));
    }

    #[test]
    fn invalid_write_is_surfaced_and_ignored() {
        let s = scheduler();
        let root = Node::tree(&s, player_schema(), player_value()).unwrap();
        s.transaction(|| {
            let err = root.write("name", json!(42)).unwrap_err();
            assert!(matches!(err, ReactiveError::InvalidValue { .. }));
            // The rejected write left no trace; later writes still work.
            assert!(root.pending_patch().is_empty());
            root.write("name", json!("ok")).unwrap();
        });
        assert_eq!(root.snapshot()["name"], json!("ok"));
    }

    #[test]
    fn unknown_key_fails_loudly() {
        let s = scheduler();
        let root = Node::tree(&s, player_schema(), player_value()).unwrap();
        let err = root.read("missing").unwrap_err();
        assert!(matches!(err, ReactiveError::UnknownKey { .. }));
        s.transaction(|| {
            let err = root.write("missing", json!(1)).unwrap_err();
            assert!(matches!(err, ReactiveError::UnknownKey { .. }));
        });
    }

    #[test]
    fn read_returns_node_for_composites_and_value_for_leaves() {
        let s = scheduler();
        let root = Node::tree(&s, player_schema(), player_value()).unwrap();
        let stats = root.read("stats").unwrap();
        let stats = stats.as_node().unwrap().clone();
        assert_eq!(stats.path(), "/stats");
        assert_eq!(root.get("name").unwrap(), json!("ada"));
        assert_eq!(stats.get("health").unwrap(), json!(100));
    }

    #[test]
    fn map_insert_and_remove_emit_patches() {
        let s = scheduler();
        let root = Node::tree(&s, Schema::map(Schema::Number), json!({"a": 1})).unwrap();
        s.transaction(|| {
            root.write("b", json!(2)).unwrap();
            root.remove("a").unwrap();
        });
        assert_eq!(root.snapshot(), json!({"b": 2}));
    }

    #[test]
    fn list_ops_shift_siblings() {
        let s = scheduler();
        let root = Node::tree(&s, Schema::list(Schema::Number), json!([1, 2, 3])).unwrap();
        s.transaction(|| {
            root.insert(1, json!(9)).unwrap();
            assert_eq!(root.snapshot(), json!([1, 9, 2, 3]));
            root.remove("0").unwrap();
            assert_eq!(root.snapshot(), json!([9, 2, 3]));
            root.push(json!(4)).unwrap();
            root.move_entry(3, 0).unwrap();
        });
        assert_eq!(root.snapshot(), json!([4, 9, 2, 3]));
    }

    #[test]
    fn list_child_paths_follow_index_shifts() {
        let s = scheduler();
        let root = Node::tree(&s, Schema::list(Schema::list(Schema::Number)), json!([[1], [2]]))
            .unwrap();
        let second = root.read("1").unwrap().as_node().unwrap().clone();
        assert_eq!(second.path(), "/1");
        s.transaction(|| {
            root.remove("0").unwrap();
        });
        assert_eq!(second.path(), "/0");
    }

    #[test]
    fn variant_rebind_preserves_identity() {
        let s = scheduler();
        let schema = Schema::variant([
            Schema::record([("health", Schema::Number)]),
            Schema::list(Schema::Number),
        ]);
        let node = Node::tree(&s, schema, json!({"health": 10})).unwrap();
        let id = node.id();
        assert_eq!(node.bound_candidate(), Some(0));

        s.transaction(|| {
            node.set_value(json!([1, 2, 3])).unwrap();
            // One structural replace at the variant's own path.
            assert_eq!(
                node.pending_patch().forward,
                vec![PatchOp::Replace {
                    path: "".into(),
                    value: json!([1, 2, 3]),
                }]
            );
        });
        assert_eq!(node.id(), id);
        assert_eq!(node.bound_candidate(), Some(1));
        assert_eq!(node.snapshot(), json!([1, 2, 3]));
    }

    #[test]
    fn composite_child_replacement_keeps_child_id() {
        let s = scheduler();
        let root = Node::tree(&s, player_schema(), player_value()).unwrap();
        let stats = root.read("stats").unwrap().as_node().unwrap().clone();
        let stats_id = stats.id();
        s.transaction(|| {
            root.write("stats", json!({"health": 1})).unwrap();
        });
        let stats_after = root.read("stats").unwrap().as_node().unwrap().clone();
        assert_eq!(stats_after.id(), stats_id);
        assert_eq!(stats_after.get("health").unwrap(), json!(1));
    }

    #[test]
    fn patches_replay_forward_and_backward() {
        let s = scheduler();
        let root = Node::tree(
            &s,
            Schema::record([
                ("name", Schema::String),
                ("tags", Schema::list(Schema::Number)),
            ]),
            json!({"name": "ada", "tags": [1, 2]}),
        )
        .unwrap();
        let before = root.snapshot();
        let drained = s.transaction(|| {
            root.write("name", json!("grace")).unwrap();
            let tags = root.read("tags").unwrap().as_node().unwrap().clone();
            tags.push(json!(3)).unwrap();
            tags.remove("0").unwrap();
            root.pending_patch()
        });
        let after = root.snapshot();

        let mut doc = before.clone();
        patch::apply(&mut doc, &drained.forward).unwrap();
        assert_eq!(doc, after);
        patch::apply(&mut doc, &drained.backward).unwrap();
        assert_eq!(doc, before);
    }

    #[test]
    fn snapshot_does_not_record_reads() {
        let s = scheduler();
        let root = Node::tree(&s, player_schema(), player_value()).unwrap();
        let id = crate::id::ReactorId::new();
        s.start_session(id);
        root.snapshot();
        let recorded = s.stop_session(id);
        assert!(recorded.is_empty());
    }
}
