mod memory;
mod postgres;

pub use memory::{MemoryStore, PlantRecord};
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{ActionType, CareItem, NotificationConfig};

/// The read/write surface the dispatch engine needs from storage.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Up to `limit` items whose next `action` fell due at or before `now`,
    /// most overdue first.
    async fn scan_due(
        &self,
        action: ActionType,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<CareItem>, StoreError>;

    /// `Ok(None)` when the user never got a config.
    async fn get_notification_config(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationConfig>, StoreError>;

    /// Inserts `config`. If the user already has one, that one is kept and
    /// returned instead.
    async fn create_notification_config(
        &self,
        config: NotificationConfig,
    ) -> Result<NotificationConfig, StoreError>;

    /// Full replace, keyed by user id.
    async fn update_notification_config(
        &self,
        config: NotificationConfig,
    ) -> Result<NotificationConfig, StoreError>;
}
