use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The four care reminder categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Watering,
    Fertilizing,
    Misting,
    Repotting,
}

impl ActionType {
    /// Processing order of a dispatch cycle.
    pub const ALL: [ActionType; 4] = [
        ActionType::Watering,
        ActionType::Fertilizing,
        ActionType::Misting,
        ActionType::Repotting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Watering => "watering",
            ActionType::Fertilizing => "fertilizing",
            ActionType::Misting => "misting",
            ActionType::Repotting => "repotting",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-owned item that is due for some action. Read fresh every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareItem {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

impl CareItem {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Android,
    Ios,
    Web,
    #[serde(other)]
    Unknown,
}

impl DeviceClass {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "android" => DeviceClass::Android,
            "ios" => DeviceClass::Ios,
            "web" => DeviceClass::Web,
            _ => DeviceClass::Unknown,
        }
    }
}

/// A device push token. Keyed by device id inside [`NotificationConfig::registrations`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub token: String,
    pub device_class: DeviceClass,
    pub added_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub active: bool,
}

/// Per-user reminder settings plus the user's device registrations.
///
/// At most one exists per user. The dispatch engine only ever touches
/// `last_notification_sent_at`, `updated_at` and the `active` flag of
/// registrations; everything else belongs to the user's own settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub id: String,
    pub user_id: String,
    pub enabled: bool,
    pub remind_watering: bool,
    pub remind_fertilizing: bool,
    pub remind_misting: bool,
    pub remind_repotting: bool,
    pub muted_item_ids: BTreeSet<String>,
    pub last_notification_sent_at: Option<DateTime<Utc>>,
    pub registrations: BTreeMap<String, Registration>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationConfig {
    /// Everything on, nothing muted, no devices.
    pub fn with_defaults(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            enabled: true,
            remind_watering: true,
            remind_fertilizing: true,
            remind_misting: true,
            remind_repotting: true,
            muted_item_ids: BTreeSet::new(),
            last_notification_sent_at: None,
            registrations: BTreeMap::new(),
            updated_at: now,
        }
    }

    pub fn reminds(&self, action: ActionType) -> bool {
        match action {
            ActionType::Watering => self.remind_watering,
            ActionType::Fertilizing => self.remind_fertilizing,
            ActionType::Misting => self.remind_misting,
            ActionType::Repotting => self.remind_repotting,
        }
    }

    pub fn set_reminds(&mut self, action: ActionType, on: bool) {
        match action {
            ActionType::Watering => self.remind_watering = on,
            ActionType::Fertilizing => self.remind_fertilizing = on,
            ActionType::Misting => self.remind_misting = on,
            ActionType::Repotting => self.remind_repotting = on,
        }
    }

    pub fn is_muted(&self, item_id: &str) -> bool {
        self.muted_item_ids.contains(item_id)
    }

    /// True while `now` is still inside `window` of the last sent reminder.
    /// The window is shared by all action types.
    pub fn in_cooldown(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_notification_sent_at {
            Some(last) => now.signed_duration_since(last) < window,
            None => false,
        }
    }

    /// Tokens of active registrations, in device-id order.
    pub fn active_tokens(&self) -> Vec<String> {
        self.registrations
            .values()
            .filter(|r| r.active)
            .map(|r| r.token.clone())
            .collect()
    }

    /// Registers `token` for `device_id`. An existing entry for the device
    /// gets the new token and is reactivated; it is never duplicated.
    pub fn upsert_registration(
        &mut self,
        device_id: &str,
        token: &str,
        device_class: DeviceClass,
        now: DateTime<Utc>,
    ) {
        self.registrations
            .entry(device_id.to_string())
            .and_modify(|r| {
                r.token = token.to_string();
                r.device_class = device_class;
                r.last_used_at = now;
                r.active = true;
            })
            .or_insert_with(|| Registration {
                token: token.to_string(),
                device_class,
                added_at: now,
                last_used_at: now,
                active: true,
            });
        self.updated_at = now;
    }

    pub fn remove_registration(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        let removed = self.registrations.remove(device_id).is_some();
        if removed {
            self.updated_at = now;
        }
        removed
    }

    /// Marks every registration holding one of `tokens` inactive.
    /// Returns how many registrations flipped from active to inactive.
    pub fn deactivate_tokens(&mut self, tokens: &[String]) -> usize {
        let mut flipped = 0;
        for registration in self.registrations.values_mut() {
            if registration.active && tokens.iter().any(|t| *t == registration.token) {
                registration.active = false;
                flipped += 1;
            }
        }
        flipped
    }
}
