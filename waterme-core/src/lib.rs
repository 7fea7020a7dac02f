pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod push;
pub mod redis;
pub mod registration;
pub mod schema;
pub mod store;
pub mod types;

pub use config::Config;
pub use context::WorkerContext;
pub use db::DbPool;
pub use error::{ProviderError, RegistrationError, StoreError, TemplateLoadError};
pub use push::{mask_token, PushMessage, PushProvider, TokenOutcome, MAX_TOKENS_PER_CALL};
pub use crate::redis::{CycleLease, RedisPool};
pub use store::{MemoryStore, PgStore, PlantRecord, ReminderStore};
pub use types::{ActionType, CareItem, DeviceClass, NotificationConfig, Registration};
