//! Key-value document store seen by the identity core.
//!
//! Paths are `/`-separated (`users/<id>`, `userIDByUsername/<name>`). A
//! path names a node in one JSON tree: reading a child path sees the
//! matching part of its parent document, and putting `null` deletes the node.
//! Backends offer no transactions across paths.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared::{Result, ServiceError};

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the document at `path`. Absent, `null` and empty-object nodes
    /// all read as `None`.
    ///
    /// Fails with `StoreUnavailable` when the backend cannot be reached.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replaces the document at `path`; `Value::Null` deletes it.
    ///
    /// Fails with `StoreUnavailable` or `StoreRejected`.
    async fn put(&self, path: &str, document: Value) -> Result<()>;
}

/// Splits a store path into its non-empty segments.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Follows `segments` down from `node`.
pub(crate) fn navigate<'a>(node: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(node, |current, segment| current.get(*segment))
}

/// Absent, `null` and `{}` are all "no document".
pub(crate) fn present(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(other) => Some(other.clone()),
    }
}

/// Writes `document` at `segments` below `node`, creating intermediate
/// objects (and replacing scalars in the way). `null` removes the leaf.
pub(crate) fn set_at(node: &mut Value, segments: &[&str], document: Value) -> Result<()> {
    let Some((leaf, parents)) = segments.split_last() else {
        *node = document;
        return Ok(());
    };

    let mut current = node;
    for segment in parents {
        let map = as_object_mut(current)?;
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = as_object_mut(current)?;
    if document.is_null() {
        map.remove(*leaf);
    } else {
        map.insert(leaf.to_string(), document);
    }
    Ok(())
}

fn as_object_mut(node: &mut Value) -> Result<&mut Map<String, Value>> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
        .ok_or_else(|| ServiceError::Internal("Document node is not an object".to_string()))
}
