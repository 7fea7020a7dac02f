use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Timestamptz};
use diesel_async::RunQueryDsl;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::db::{DbConnection, DbPool};
use crate::error::StoreError;
use crate::schema::{notification_configs, plants};
use crate::store::ReminderStore;
use crate::types::{ActionType, CareItem, NotificationConfig, Registration};

#[derive(QueryableByName)]
#[diesel(table_name = plants)]
struct DueRow {
    id: String,
    user_id: String,
    name: String,
}

#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = notification_configs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
struct ConfigRow {
    id: String,
    user_id: String,
    enabled: bool,
    remind_watering: bool,
    remind_fertilizing: bool,
    remind_misting: bool,
    remind_repotting: bool,
    muted_item_ids: serde_json::Value,
    registrations: serde_json::Value,
    last_notification_sent_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl ConfigRow {
    fn from_config(config: &NotificationConfig) -> Result<Self, StoreError> {
        Ok(ConfigRow {
            id: config.id.clone(),
            user_id: config.user_id.clone(),
            enabled: config.enabled,
            remind_watering: config.remind_watering,
            remind_fertilizing: config.remind_fertilizing,
            remind_misting: config.remind_misting,
            remind_repotting: config.remind_repotting,
            muted_item_ids: serde_json::to_value(&config.muted_item_ids)?,
            registrations: serde_json::to_value(&config.registrations)?,
            last_notification_sent_at: config.last_notification_sent_at,
            updated_at: config.updated_at,
        })
    }

    fn into_config(self) -> Result<NotificationConfig, StoreError> {
        let muted_item_ids: BTreeSet<String> = serde_json::from_value(self.muted_item_ids)?;
        let registrations: BTreeMap<String, Registration> =
            serde_json::from_value(self.registrations)?;

        Ok(NotificationConfig {
            id: self.id,
            user_id: self.user_id,
            enabled: self.enabled,
            remind_watering: self.remind_watering,
            remind_fertilizing: self.remind_fertilizing,
            remind_misting: self.remind_misting,
            remind_repotting: self.remind_repotting,
            muted_item_ids,
            last_notification_sent_at: self.last_notification_sent_at,
            registrations,
            updated_at: self.updated_at,
        })
    }
}

/// Due predicates. `$1` is the scan time, `$2` the page size.
fn due_query(action: ActionType) -> &'static str {
    match action {
        ActionType::Watering => {
            "SELECT id, user_id, name FROM plants \
             WHERE watering_interval_days > 0 \
               AND last_watered + make_interval(days => watering_interval_days) <= $1 \
             ORDER BY last_watered ASC \
             LIMIT $2"
        }
        ActionType::Fertilizing => {
            "SELECT id, user_id, name FROM plants \
             WHERE fertilizing_interval_days > 0 \
               AND last_fertilized + make_interval(days => fertilizing_interval_days) <= $1 \
             ORDER BY last_fertilized ASC \
             LIMIT $2"
        }
        ActionType::Misting => {
            "SELECT id, user_id, name FROM plants \
             WHERE spray_interval_days > 0 \
               AND COALESCE(last_misted, created_at) + make_interval(days => spray_interval_days) <= $1 \
             ORDER BY COALESCE(last_misted, created_at) ASC \
             LIMIT $2"
        }
        ActionType::Repotting => {
            "SELECT id, user_id, name FROM plants \
             WHERE repotting_interval_days > 0 \
               AND COALESCE(last_repotted, created_at) + make_interval(days => repotting_interval_days) <= $1 \
             ORDER BY COALESCE(last_repotted, created_at) ASC \
             LIMIT $2"
        }
    }
}

/// Postgres-backed store over the shared diesel-async pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<DbPool>,
}

impl PgStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<DbConnection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl ReminderStore for PgStore {
    async fn scan_due(
        &self,
        action: ActionType,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<CareItem>, StoreError> {
        let mut conn = self.conn().await?;

        let rows: Vec<DueRow> = diesel::sql_query(due_query(action))
            .bind::<Timestamptz, _>(now)
            .bind::<BigInt, _>(limit)
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| CareItem {
                id: row.id,
                user_id: row.user_id,
                name: row.name,
            })
            .collect())
    }

    async fn get_notification_config(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationConfig>, StoreError> {
        let mut conn = self.conn().await?;

        let row: Option<ConfigRow> = notification_configs::table
            .filter(notification_configs::user_id.eq(user_id))
            .select(ConfigRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        row.map(ConfigRow::into_config).transpose()
    }

    async fn create_notification_config(
        &self,
        config: NotificationConfig,
    ) -> Result<NotificationConfig, StoreError> {
        let row = ConfigRow::from_config(&config)?;
        let mut conn = self.conn().await?;

        let inserted: Option<ConfigRow> = diesel::insert_into(notification_configs::table)
            .values(&row)
            .on_conflict(notification_configs::user_id)
            .do_nothing()
            .returning(ConfigRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?;

        match inserted {
            Some(row) => row.into_config(),
            None => {
                tracing::debug!("Notification config for user {} already exists", config.user_id);
                let existing: ConfigRow = notification_configs::table
                    .filter(notification_configs::user_id.eq(&config.user_id))
                    .select(ConfigRow::as_select())
                    .first(&mut conn)
                    .await?;
                existing.into_config()
            }
        }
    }

    async fn update_notification_config(
        &self,
        config: NotificationConfig,
    ) -> Result<NotificationConfig, StoreError> {
        let row = ConfigRow::from_config(&config)?;
        let mut conn = self.conn().await?;

        let updated: Option<ConfigRow> = diesel::update(
            notification_configs::table.filter(notification_configs::user_id.eq(&row.user_id)),
        )
        .set(&row)
        .returning(ConfigRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()?;

        match updated {
            Some(row) => row.into_config(),
            None => Err(StoreError::NotFound(config.user_id)),
        }
    }
}
