use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient};
use serde_json::{Map, Value};
use shared::{RedisConfig, Result, ServiceError};
use tracing::{debug, error};

use super::{navigate, present, segments, set_at, KeyValueStore};

/// Redis-backed document store.
///
/// Each top-level collection (`users`, `userIDByUsername`) is one hash at
/// `<prefix>:<collection>`; each child is a hash field holding JSON. Deeper
/// paths are read-modify-write on that field.
#[derive(Clone)]
pub struct RedisStore {
    redis: MultiplexedConnection,
    key_prefix: String,
}

impl RedisStore {
    pub fn new(redis: MultiplexedConnection, key_prefix: impl Into<String>) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
        }
    }

    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = RedisClient::open(config.url.as_str())?;
        let redis = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(redis, config.key_prefix.clone()))
    }

    fn collection_key(&self, collection: &str) -> String {
        format!("{}:{}", self.key_prefix, collection)
    }

    pub async fn health_check(&self) -> bool {
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }

    async fn read_field(&self, key: &str, field: &str) -> Result<Option<Value>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.hget(key, field).await.map_err(|e| {
            error!(key = key, field = field, error = %e, "Redis HGET failed");
            ServiceError::from(e)
        })?;

        raw.map(|json| decode(key, &json)).transpose()
    }

    async fn write_field(&self, key: &str, field: &str, document: Value) -> Result<()> {
        let mut conn = self.redis.clone();
        if present(Some(&document)).is_none() {
            let _: () = conn.hdel(key, field).await?;
        } else {
            let _: () = conn.hset(key, field, document.to_string()).await?;
        }
        Ok(())
    }

    async fn read_collection(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;

        let mut map = Map::with_capacity(fields.len());
        for (field, json) in fields {
            map.insert(field, decode(key, &json)?);
        }
        Ok(present(Some(&Value::Object(map))))
    }

    async fn write_collection(&self, key: &str, document: Value) -> Result<()> {
        let entries = match document {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(ServiceError::StoreRejected(format!(
                    "Collection {} must be an object, got {}",
                    key, other
                )))
            }
        };

        let items: Vec<(String, String)> = entries
            .into_iter()
            .filter(|(_, value)| present(Some(value)).is_some())
            .map(|(field, value)| (field, value.to_string()))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !items.is_empty() {
            pipe.hset_multiple(key, &items).ignore();
        }

        let mut conn = self.redis.clone();
        pipe.query_async::<()>(&mut conn).await?;

        debug!(key = key, fields = items.len(), "Replaced collection");

        Ok(())
    }
}

fn decode(key: &str, json: &str) -> Result<Value> {
    serde_json::from_str(json).map_err(|e| ServiceError::MalformedDocument {
        path: key.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        match segments(path).as_slice() {
            [] => Err(ServiceError::StoreRejected(
                "Reading the store root is not supported".to_string(),
            )),
            [collection] => self.read_collection(&self.collection_key(collection)).await,
            [collection, field, rest @ ..] => {
                let key = self.collection_key(collection);
                let doc = self.read_field(&key, field).await?;
                Ok(doc.and_then(|doc| present(navigate(&doc, rest))))
            }
        }
    }

    async fn put(&self, path: &str, document: Value) -> Result<()> {
        match segments(path).as_slice() {
            [] => Err(ServiceError::StoreRejected(
                "Refusing to overwrite the store root".to_string(),
            )),
            [collection] => {
                self.write_collection(&self.collection_key(collection), document)
                    .await
            }
            [collection, field] => {
                self.write_field(&self.collection_key(collection), field, document)
                    .await
            }
            [collection, field, rest @ ..] => {
                let key = self.collection_key(collection);
                let mut doc = self
                    .read_field(&key, field)
                    .await?
                    .unwrap_or_else(|| Value::Object(Map::new()));
                set_at(&mut doc, rest, document)?;
                self.write_field(&key, field, doc).await
            }
        }
    }
}
