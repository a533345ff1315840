use std::env;
use std::str::FromStr;

use crate::errors::{Result, ServiceError};

pub const DEFAULT_MESSAGE_COOLDOWN_MS: i64 = 2000;
pub const DEFAULT_PLACEHOLDER_CHATROOM: &str = "Unanimity";
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 1999;

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| ServiceError::Config(format!("Invalid {}: {}", key, e)))
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
}

impl RedisConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL")
                .map_err(|_| ServiceError::Config("REDIS_URL not set".to_string()))?,
            key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "unanimity".to_string()),
        })
    }
}

/// Settings for the outbound message gate. Supplied by the embedding client.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub cooldown_ms: i64,
    pub placeholder_chatroom: String,
    pub max_message_length: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_MESSAGE_COOLDOWN_MS,
            placeholder_chatroom: DEFAULT_PLACEHOLDER_CHATROOM.to_string(),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

/// Settings for the rename saga and the index reconciler.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub compensate_on_partial_failure: bool,
    pub reconcile_interval_secs: u64,
    pub reconcile_dry_run: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            compensate_on_partial_failure: false,
            reconcile_interval_secs: 300,
            reconcile_dry_run: false,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            compensate_on_partial_failure: env_or("COMPENSATE_ON_PARTIAL_FAILURE", "false")?,
            reconcile_interval_secs: env_or("RECONCILE_INTERVAL_SECS", "300")?,
            reconcile_dry_run: env_or("RECONCILE_DRY_RUN", "false")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub metrics_port: u16,
    pub identity: IdentityConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            metrics_port: env_or("METRICS_PORT", "9093")?,
            identity: IdentityConfig::from_env()?,
        })
    }
}
