use std::sync::Arc;

use serde_json::Value;
use shared::{NameIndex, Result, ServiceError, UserId, Username, NAME_INDEX_PATH};

use crate::store::KeyValueStore;

/// Access to the `userIDByUsername` document.
#[derive(Clone)]
pub struct NameIndexRepository {
    store: Arc<dyn KeyValueStore>,
}

impl NameIndexRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Single-entry read of `userIDByUsername/<name>`.
    pub async fn lookup(&self, user_name: &Username) -> Result<Option<UserId>> {
        let path = user_name.index_entry_path();
        match self.store.get(&path).await? {
            None => Ok(None),
            Some(Value::String(id)) => UserId::from_string(&id).map(Some),
            Some(other) => Err(ServiceError::MalformedDocument {
                path,
                reason: format!("expected a user id string, got {}", other),
            }),
        }
    }

    /// Reads the whole index; a missing document is an empty index.
    pub async fn load(&self) -> Result<NameIndex> {
        match self.store.get(NAME_INDEX_PATH).await? {
            None => Ok(NameIndex::new()),
            Some(doc) => serde_json::from_value(doc).map_err(|e| ServiceError::MalformedDocument {
                path: NAME_INDEX_PATH.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Writes the whole index back in one put.
    pub async fn save(&self, index: &NameIndex) -> Result<()> {
        let doc = serde_json::to_value(index)?;
        self.store.put(NAME_INDEX_PATH, doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_lookup_reads_single_entry() {
        let store = MemoryStore::new();
        store.put(NAME_INDEX_PATH, json!({ "validname": "u1" })).await.unwrap();
        let repo = NameIndexRepository::new(Arc::new(store));

        let taken = Username::from_candidate("validname").unwrap();
        let free = Username::from_candidate("freename").unwrap();
        assert_eq!(repo.lookup(&taken).await.unwrap(), Some(UserId::from_string("u1").unwrap()));
        assert_eq!(repo.lookup(&free).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_rejects_non_string_entry() {
        let store = MemoryStore::new();
        store.put(NAME_INDEX_PATH, json!({ "validname": 12 })).await.unwrap();
        let repo = NameIndexRepository::new(Arc::new(store));

        let err = repo
            .lookup(&Username::from_candidate("validname").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MalformedDocument { .. }));
    }

    #[tokio::test]
    async fn test_load_missing_index_is_empty() {
        let repo = NameIndexRepository::new(Arc::new(MemoryStore::new()));
        assert!(repo.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let repo = NameIndexRepository::new(Arc::new(MemoryStore::new()));
        let mut index = NameIndex::new();
        index.insert("alice", UserId::from_string("u1").unwrap());
        index.insert("bobby", UserId::from_string("u2").unwrap());

        repo.save(&index).await.unwrap();
        assert_eq!(repo.load().await.unwrap(), index);
    }
}
