use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing;
use waterme_core::config::WorkerConfig;
use waterme_core::{ActionType, CareItem, PushMessage, ReminderStore, StoreError};

use crate::composer::MessageComposer;
use crate::deadline::within;
use crate::dispatcher::BatchDispatcher;
use crate::policy::{self, PolicyDecision, SkipReason};
use crate::reconciler;
use crate::scanner;
use crate::stats::DispatchStats;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub cooldown: Duration,
    pub page_size: i64,
    pub user_concurrency: usize,
}

impl From<&WorkerConfig> for DispatchSettings {
    fn from(config: &WorkerConfig) -> Self {
        DispatchSettings {
            cooldown: config.cooldown(),
            page_size: config.scan_page_size,
            user_concurrency: config.user_concurrency.max(1),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings::from(&WorkerConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOutcome {
    Skipped(SkipReason),
    ConfigUnavailable,
    Notified { items: usize, failed_tokens: usize },
}

pub struct ReminderService {
    store: Arc<dyn ReminderStore>,
    composer: MessageComposer,
    dispatcher: BatchDispatcher,
    settings: DispatchSettings,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        composer: MessageComposer,
        dispatcher: BatchDispatcher,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            composer,
            dispatcher,
            settings,
        }
    }

    /// Scan, group and notify every user with items due for `action`.
    /// A failed scan abandons this action type only.
    pub async fn process_action(
        &self,
        action: ActionType,
        now: DateTime<Utc>,
        stats: &DispatchStats,
        deadline: Instant,
    ) {
        let items = match scanner::scan_due(
            self.store.as_ref(),
            action,
            self.settings.page_size,
            now,
            deadline,
        )
        .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("Error fetching items needing {}: {}", action, e);
                return;
            }
        };

        if items.is_empty() {
            tracing::debug!("No items need {}", action);
            return;
        }

        tracing::info!("Found {} items needing {}", items.len(), action);
        stats.record_scanned(items.len());

        // Each user appears once per action type, so per-user config writes
        // never race inside this fan-out.
        stream::iter(scanner::group_by_user(items))
            .for_each_concurrent(self.settings.user_concurrency, |(user_id, items)| async move {
                self.notify_user(&user_id, action, items, now, stats, deadline).await;
            })
            .await;
    }

    /// Filter, compose, dispatch and reconcile for one user.
    pub async fn notify_user(
        &self,
        user_id: &str,
        action: ActionType,
        items: Vec<CareItem>,
        now: DateTime<Utc>,
        stats: &DispatchStats,
        deadline: Instant,
    ) -> UserOutcome {
        let config = match within(
            deadline,
            || StoreError::Timeout,
            self.store.get_notification_config(user_id),
        )
        .await
        {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Error loading notification config for user {}: {}", user_id, e);
                return UserOutcome::ConfigUnavailable;
            }
        };

        let recipients = match policy::evaluate(config, action, items, now, self.settings.cooldown) {
            PolicyDecision::Notify(recipients) => recipients,
            PolicyDecision::Skip(reason) => {
                tracing::trace!("Skipping {} reminder for user {}: {:?}", action, user_id, reason);
                return UserOutcome::Skipped(reason);
            }
        };

        let rendered = self.composer.compose(action, &recipients.items);
        let item_count = recipients.items.len();
        let message = PushMessage {
            title: rendered.title,
            body: rendered.body,
            data: BTreeMap::from([
                ("type".to_string(), action.as_str().to_string()),
                ("itemCount".to_string(), item_count.to_string()),
            ]),
        };

        let failed = self
            .dispatcher
            .dispatch(&recipients.tokens, &message, stats, deadline)
            .await;

        reconciler::reconcile(self.store.as_ref(), recipients.config, &failed, now, deadline).await;

        stats.record_user_notified();
        tracing::info!(
            "Sent {} notifications to user {} for {} items",
            action,
            user_id,
            item_count
        );

        UserOutcome::Notified {
            items: item_count,
            failed_tokens: failed.len(),
        }
    }
}
