//! Structural diff operations.
//!
//! Every mutation inside a transaction appends one op to the owning root's
//! patch buffer, together with its inverse. At commit the buffer is drained
//! into a [`Patch`]: the forward list replayed in order maps the
//! pre-transaction snapshot to the post-transaction snapshot, and the
//! backward list maps post back to pre.
//!
//! Ops use JSON-Pointer paths (RFC 6901 escaping), so a serialized patch is
//! directly consumable by JSON-Patch tooling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReactiveError;

/// A single structural diff operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a value at `path`. For lists, siblings at and after the index
    /// shift right.
    Add { path: String, value: Value },
    /// Replace the value at `path`.
    Replace { path: String, value: Value },
    /// Remove the value at `path`. For lists, later siblings shift left.
    Remove { path: String },
    /// Remove the value at `from` and insert it at `path`.
    Move { from: String, path: String },
    /// Clone the value at `from` and insert it at `path`.
    Copy { from: String, path: String },
}

impl PatchOp {
    /// The target path of this op.
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Replace { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Move { path, .. }
            | PatchOp::Copy { path, .. } => path,
        }
    }
}

/// One transaction's effect on a root node, in both directions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Ops mapping the pre-transaction snapshot to the post-transaction one.
    pub forward: Vec<PatchOp>,
    /// Ops mapping the post-transaction snapshot back to the pre one.
    pub backward: Vec<PatchOp>,
}

impl Patch {
    /// Whether the transaction touched this root at all.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Escape a single key for use as a JSON-Pointer segment.
pub fn escape_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn split_path(path: &str) -> Result<Vec<String>, ReactiveError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if !path.starts_with('/') {
        return Err(ReactiveError::BadPatch {
            path: path.to_string(),
        });
    }
    Ok(path[1..].split('/').map(unescape_segment).collect())
}

fn bad(path: &str) -> ReactiveError {
    ReactiveError::BadPatch {
        path: path.to_string(),
    }
}

/// Navigate to the value at `segments`, if present.
fn resolve<'a>(doc: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut cur = doc;
    for seg in segments {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

fn insert_at(doc: &mut Value, path: &str, value: Value) -> Result<(), ReactiveError> {
    let segments = split_path(path)?;
    let Some((last, parents)) = segments.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = resolve_mut(doc, parents).ok_or_else(|| bad(path))?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = if last == "-" {
                items.len()
            } else {
                last.parse::<usize>().map_err(|_| bad(path))?
            };
            if index > items.len() {
                return Err(bad(path));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(bad(path)),
    }
}

fn remove_at(doc: &mut Value, path: &str) -> Result<Value, ReactiveError> {
    let segments = split_path(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Err(bad(path));
    };
    let parent = resolve_mut(doc, parents).ok_or_else(|| bad(path))?;
    match parent {
        Value::Object(map) => map.shift_remove(last).ok_or_else(|| bad(path)),
        Value::Array(items) => {
            let index = last.parse::<usize>().map_err(|_| bad(path))?;
            if index >= items.len() {
                return Err(bad(path));
            }
            Ok(items.remove(index))
        }
        _ => Err(bad(path)),
    }
}

fn resolve_mut<'a>(doc: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut cur = doc;
    for seg in segments {
        cur = match cur {
            Value::Object(map) => map.get_mut(seg)?,
            Value::Array(items) => items.get_mut(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Replay a list of ops against a document, in order.
pub fn apply(doc: &mut Value, ops: &[PatchOp]) -> Result<(), ReactiveError> {
    for op in ops {
        match op {
            PatchOp::Add { path, value } => insert_at(doc, path, value.clone())?,
            PatchOp::Replace { path, value } => {
                let segments = split_path(path)?;
                let target = resolve_mut(doc, &segments).ok_or_else(|| bad(path))?;
                *target = value.clone();
            }
            PatchOp::Remove { path } => {
                remove_at(doc, path)?;
            }
            PatchOp::Move { from, path } => {
                let value = remove_at(doc, from)?;
                insert_at(doc, path, value)?;
            }
            PatchOp::Copy { from, path } => {
                let segments = split_path(from)?;
                let value = resolve(doc, &segments).ok_or_else(|| bad(from))?.clone();
                insert_at(doc, path, value)?;
            }
        }
    }
    Ok(())
}
