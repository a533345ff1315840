use std::sync::Arc;

use serde_json::Value;
use shared::{Result, ServiceError, UserId, UserRecord, USERS_PATH};

use crate::store::KeyValueStore;

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn KeyValueStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserRecord>> {
        let path = user_id.record_path();
        self.store
            .get(&path)
            .await?
            .map(|doc| decode_record(&path, doc))
            .transpose()
    }

    /// Writes `record` to `users/<user_id>`.
    pub async fn put(&self, user_id: &UserId, record: &UserRecord) -> Result<()> {
        let doc = serde_json::to_value(record)?;
        self.store.put(&user_id.record_path(), doc).await
    }

    /// Every decodable record, keyed by the id in its path.
    ///
    /// Undecodable entries are logged and skipped.
    pub async fn list_all(&self) -> Result<Vec<(UserId, UserRecord)>> {
        let Some(Value::Object(users)) = self.store.get(USERS_PATH).await? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::with_capacity(users.len());
        for (key, doc) in users {
            let path = format!("{}/{}", USERS_PATH, key);
            match UserId::from_string(&key).and_then(|id| Ok((id, decode_record(&path, doc)?))) {
                Ok(entry) => records.push(entry),
                Err(e) => tracing::warn!(path = %path, error = %e, "Skipping undecodable user record"),
            }
        }

        Ok(records)
    }
}

fn decode_record(path: &str, doc: Value) -> Result<UserRecord> {
    serde_json::from_value(doc).map_err(|e| ServiceError::MalformedDocument {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
