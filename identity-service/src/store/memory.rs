use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared::{Result, ServiceError};
use tokio::sync::RwLock;

use super::{navigate, present, segments, set_at, KeyValueStore};

/// In-process JSON tree. Clones share the same tree.
#[derive(Clone)]
pub struct MemoryStore {
    root: Arc<RwLock<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
        }
    }

    /// Copy of the whole tree.
    pub async fn snapshot(&self) -> Value {
        self.root.read().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let root = self.root.read().await;
        Ok(present(navigate(&root, &segments(path))))
    }

    async fn put(&self, path: &str, document: Value) -> Result<()> {
        let segments = segments(path);
        if segments.is_empty() {
            return Err(ServiceError::StoreRejected(
                "Refusing to overwrite the store root".to_string(),
            ));
        }

        let mut root = self.root.write().await;
        set_at(&mut root, &segments, document)?;

        tracing::trace!(path = path, "Memory store write");

        Ok(())
    }
}
