use chrono::{DateTime, Duration, Utc};
use waterme_core::{ActionType, CareItem, NotificationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoConfig,
    Disabled,
    ActionDisabled,
    Cooldown,
    AllMuted,
    NoActiveDevices,
}

/// What survives the filter: the items to mention and the tokens to reach.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipients {
    pub config: NotificationConfig,
    pub items: Vec<CareItem>,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    Skip(SkipReason),
    Notify(Recipients),
}

/// Decides whether a user gets a reminder for `action` in this cycle.
///
/// The cooldown is checked against the single `last_notification_sent_at`
/// of the config, so a reminder of any type holds back all other types.
pub fn evaluate(
    config: Option<NotificationConfig>,
    action: ActionType,
    items: Vec<CareItem>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> PolicyDecision {
    let Some(config) = config else {
        return PolicyDecision::Skip(SkipReason::NoConfig);
    };

    if !config.enabled {
        return PolicyDecision::Skip(SkipReason::Disabled);
    }
    if !config.reminds(action) {
        return PolicyDecision::Skip(SkipReason::ActionDisabled);
    }
    if config.in_cooldown(now, cooldown) {
        return PolicyDecision::Skip(SkipReason::Cooldown);
    }

    let items: Vec<CareItem> = items
        .into_iter()
        .filter(|item| !config.is_muted(&item.id))
        .collect();
    if items.is_empty() {
        return PolicyDecision::Skip(SkipReason::AllMuted);
    }

    let tokens = config.active_tokens();
    if tokens.is_empty() {
        return PolicyDecision::Skip(SkipReason::NoActiveDevices);
    }

    PolicyDecision::Notify(Recipients {
        config,
        items,
        tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use waterme_core::DeviceClass;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap()
    }

    fn config() -> NotificationConfig {
        let mut config = NotificationConfig::with_defaults("u1", now());
        config.upsert_registration("phone", "tok-1", DeviceClass::Android, now());
        config
    }

    fn items() -> Vec<CareItem> {
        vec![CareItem::new("a", "u1", "Fern"), CareItem::new("b", "u1", "Monstera")]
    }

    fn skip_reason(decision: PolicyDecision) -> Option<SkipReason> {
        match decision {
            PolicyDecision::Skip(reason) => Some(reason),
            PolicyDecision::Notify(_) => None,
        }
    }

    #[test]
    fn proceeds_with_active_tokens_and_unmuted_items() {
        let decision = evaluate(Some(config()), ActionType::Watering, items(), now(), Duration::hours(4));
        let PolicyDecision::Notify(recipients) = decision else {
            panic!("expected notify");
        };
        assert_eq!(recipients.items.len(), 2);
        assert_eq!(recipients.tokens, vec!["tok-1".to_string()]);
    }

    #[test]
    fn skips_without_config_or_when_disabled() {
        assert_eq!(
            skip_reason(evaluate(None, ActionType::Watering, items(), now(), Duration::hours(4))),
            Some(SkipReason::NoConfig)
        );

        let mut off = config();
        off.enabled = false;
        assert_eq!(
            skip_reason(evaluate(Some(off), ActionType::Watering, items(), now(), Duration::hours(4))),
            Some(SkipReason::Disabled)
        );

        let mut no_misting = config();
        no_misting.remind_misting = false;
        assert_eq!(
            skip_reason(evaluate(Some(no_misting), ActionType::Misting, items(), now(), Duration::hours(4))),
            Some(SkipReason::ActionDisabled)
        );
    }

    #[test]
    fn cooldown_is_shared_across_action_types() {
        let mut watered = config();
        watered.last_notification_sent_at = Some(now() - Duration::hours(1));

        for action in ActionType::ALL {
            assert_eq!(
                skip_reason(evaluate(Some(watered.clone()), action, items(), now(), Duration::hours(4))),
                Some(SkipReason::Cooldown),
                "{action} should be held back"
            );
        }

        let later = now() + Duration::hours(3);
        assert_eq!(
            skip_reason(evaluate(Some(watered), ActionType::Fertilizing, items(), later, Duration::hours(4))),
            None
        );
    }

    #[test]
    fn muting_is_per_item() {
        let mut muted = config();
        muted.muted_item_ids.insert("a".to_string());

        let PolicyDecision::Notify(recipients) =
            evaluate(Some(muted.clone()), ActionType::Watering, items(), now(), Duration::hours(4))
        else {
            panic!("item b is still due");
        };
        assert_eq!(recipients.items, vec![CareItem::new("b", "u1", "Monstera")]);

        muted.muted_item_ids.insert("b".to_string());
        assert_eq!(
            skip_reason(evaluate(Some(muted), ActionType::Watering, items(), now(), Duration::hours(4))),
            Some(SkipReason::AllMuted)
        );
    }

    #[test]
    fn skips_when_every_registration_is_inactive() {
        let mut dead = config();
        dead.deactivate_tokens(&["tok-1".to_string()]);
        assert_eq!(
            skip_reason(evaluate(Some(dead), ActionType::Repotting, items(), now(), Duration::hours(4))),
            Some(SkipReason::NoActiveDevices)
        );
    }
}
