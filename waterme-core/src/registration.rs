//! Device registration writes and lazy config materialization.
//!
//! These run on behalf of the owning user; the dispatch engine itself only
//! reads configs and flips registrations inactive.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing;

use crate::error::{RegistrationError, StoreError};
use crate::push::mask_token;
use crate::store::ReminderStore;
use crate::types::{DeviceClass, NotificationConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDevice {
    pub token: String,
    pub device_id: String,
    #[serde(default)]
    pub device_type: String,
}

/// Returns the user's config, creating the default one if absent.
pub async fn load_or_default(
    store: &dyn ReminderStore,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<NotificationConfig, StoreError> {
    if let Some(config) = store.get_notification_config(user_id).await? {
        return Ok(config);
    }

    tracing::debug!("Materializing default notification config for user {}", user_id);
    store
        .create_notification_config(NotificationConfig::with_defaults(user_id, now))
        .await
}

/// Upserts a device token by device id and persists the config.
pub async fn register_device(
    store: &dyn ReminderStore,
    user_id: &str,
    request: &RegisterDevice,
    now: DateTime<Utc>,
) -> Result<NotificationConfig, RegistrationError> {
    if request.token.trim().is_empty() {
        return Err(RegistrationError::MissingField("token"));
    }
    if request.device_id.trim().is_empty() {
        return Err(RegistrationError::MissingField("deviceId"));
    }

    let mut config = load_or_default(store, user_id, now).await?;
    config.upsert_registration(
        &request.device_id,
        &request.token,
        DeviceClass::parse(&request.device_type),
        now,
    );

    let updated = store.update_notification_config(config).await?;
    tracing::info!(
        "Registered device token {} for user {}, device {}",
        mask_token(&request.token),
        user_id,
        request.device_id
    );
    Ok(updated)
}

/// Removes a device. `Ok(false)` when the user or the device is unknown.
pub async fn remove_device(
    store: &dyn ReminderStore,
    user_id: &str,
    device_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let Some(mut config) = store.get_notification_config(user_id).await? else {
        return Ok(false);
    };

    if !config.remove_registration(device_id, now) {
        return Ok(false);
    }

    store.update_notification_config(config).await?;
    tracing::info!("Removed device {} for user {}", device_id, user_id);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn request(token: &str, device_id: &str) -> RegisterDevice {
        RegisterDevice {
            token: token.to_string(),
            device_id: device_id.to_string(),
            device_type: "android".to_string(),
        }
    }

    #[tokio::test]
    async fn first_registration_materializes_default_config() {
        let store = MemoryStore::new();

        let config = register_device(&store, "u1", &request("tok-1", "dev-1"), now())
            .await
            .unwrap();

        assert!(config.enabled);
        assert!(config.remind_watering && config.remind_repotting);
        assert!(config.muted_item_ids.is_empty());
        assert_eq!(config.active_tokens(), vec!["tok-1".to_string()]);
        assert_eq!(store.config("u1").unwrap(), config);
    }

    #[tokio::test]
    async fn re_registering_a_device_replaces_its_token() {
        let store = MemoryStore::new();
        register_device(&store, "u1", &request("tok-1", "dev-1"), now()).await.unwrap();
        let config = register_device(&store, "u1", &request("tok-2", "dev-1"), now())
            .await
            .unwrap();

        assert_eq!(config.registrations.len(), 1);
        assert_eq!(config.registrations["dev-1"].token, "tok-2");
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let store = MemoryStore::new();
        let err = register_device(&store, "u1", &request(" ", "dev-1"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::MissingField("token")));
        assert!(store.config("u1").is_none());
    }

    #[tokio::test]
    async fn remove_device_reports_unknown_devices() {
        let store = MemoryStore::new();
        assert!(!remove_device(&store, "u1", "dev-1", now()).await.unwrap());

        register_device(&store, "u1", &request("tok-1", "dev-1"), now()).await.unwrap();
        assert!(!remove_device(&store, "u1", "other", now()).await.unwrap());
        assert!(remove_device(&store, "u1", "dev-1", now()).await.unwrap());
        assert!(store.config("u1").unwrap().registrations.is_empty());
    }
}
