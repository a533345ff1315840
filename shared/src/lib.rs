pub mod config;
pub mod errors;
pub mod sanitize;
pub mod telemetry;
pub mod types;

pub use config::{IdentityConfig, MessagingConfig, RedisConfig, ServiceConfig};
pub use errors::{Result, ServiceError};
pub use sanitize::{sanitize_message, sanitize_username, strip_markup};
pub use telemetry::{init_metrics, init_tracing, record_counter, record_duration, record_gauge};
pub use types::{now_millis, NameIndex, UserId, UserRecord, Username, NAME_INDEX_PATH, USERS_PATH};
