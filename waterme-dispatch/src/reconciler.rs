use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing;
use waterme_core::{NotificationConfig, ReminderStore, StoreError};

use crate::deadline::within;

/// Applies a finished dispatch to the user's config: rejected tokens go
/// inactive, the cooldown clock restarts at `now`.
///
/// Both writes are best effort. A failed write is logged and left for a
/// later cycle; it never undoes what was already sent.
pub async fn reconcile(
    store: &dyn ReminderStore,
    config: NotificationConfig,
    failed_tokens: &[String],
    now: DateTime<Utc>,
    deadline: Instant,
) {
    let user_id = config.user_id.clone();

    // Re-read so settings changed while we were sending are not clobbered.
    let mut config = match within(
        deadline,
        || StoreError::Timeout,
        store.get_notification_config(&user_id),
    )
    .await
    {
        Ok(Some(fresh)) => fresh,
        Ok(None) => config,
        Err(e) => {
            tracing::warn!("Error re-reading notification config for user {}: {}", user_id, e);
            config
        }
    };

    if !failed_tokens.is_empty() {
        let deactivated = config.deactivate_tokens(failed_tokens);
        if deactivated > 0 {
            config.updated_at = now;
            match within(
                deadline,
                || StoreError::Timeout,
                store.update_notification_config(config.clone()),
            )
            .await
            {
                Ok(updated) => {
                    tracing::info!("Deactivated {} token(s) for user {}", deactivated, user_id);
                    config = updated;
                }
                Err(e) => {
                    tracing::error!("Error marking tokens as inactive for user {}: {}", user_id, e);
                }
            }
        }
    }

    config.last_notification_sent_at = Some(now);
    config.updated_at = now;
    if let Err(e) = within(
        deadline,
        || StoreError::Timeout,
        store.update_notification_config(config),
    )
    .await
    {
        tracing::error!("Error updating last notification sent for user {}: {}", user_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use waterme_core::{DeviceClass, MemoryStore};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 7, 30, 0).unwrap()
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    fn seeded(store: &MemoryStore) -> NotificationConfig {
        let mut config = NotificationConfig::with_defaults("u1", now());
        config.upsert_registration("a", "tok-x", DeviceClass::Android, now());
        config.upsert_registration("b", "tok-y", DeviceClass::Ios, now());
        store.put_config(config.clone());
        config
    }

    #[tokio::test]
    async fn failed_token_goes_inactive_and_cooldown_restarts() {
        let store = MemoryStore::new();
        let config = seeded(&store);

        reconcile(&store, config, &["tok-x".to_string()], now(), deadline()).await;

        let stored = store.config("u1").unwrap();
        assert!(!stored.registrations["a"].active);
        assert!(stored.registrations["b"].active);
        assert_eq!(stored.registrations["b"].token, "tok-y");
        assert_eq!(stored.last_notification_sent_at, Some(now()));
    }

    #[tokio::test]
    async fn clean_dispatch_only_touches_the_timestamp() {
        let store = MemoryStore::new();
        let config = seeded(&store);

        reconcile(&store, config.clone(), &[], now(), deadline()).await;

        let stored = store.config("u1").unwrap();
        assert_eq!(stored.registrations, config.registrations);
        assert_eq!(stored.last_notification_sent_at, Some(now()));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn keeps_settings_changed_during_dispatch() {
        let store = MemoryStore::new();
        let stale = seeded(&store);
        let mut changed = stale.clone();
        changed.remind_misting = false;
        store.put_config(changed);

        reconcile(&store, stale, &[], now(), deadline()).await;

        assert!(!store.config("u1").unwrap().remind_misting);
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let store = MemoryStore::new();
        let config = seeded(&store);
        store.set_fail_updates(true);

        reconcile(&store, config, &["tok-x".to_string()], now(), deadline()).await;

        let stored = store.config("u1").unwrap();
        assert!(stored.registrations["a"].active);
        assert_eq!(stored.last_notification_sent_at, None);
    }
}
