use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::time::Instant;
use waterme_core::{ActionType, CareItem, ReminderStore, StoreError};

use crate::deadline::within;

/// One page of items due for `action`. Whatever does not fit is picked up
/// by a later cycle.
pub async fn scan_due(
    store: &dyn ReminderStore,
    action: ActionType,
    page_size: i64,
    now: DateTime<Utc>,
    deadline: Instant,
) -> Result<Vec<CareItem>, StoreError> {
    within(deadline, || StoreError::Timeout, store.scan_due(action, page_size, now)).await
}

/// Groups items by owner. Order inside a group follows the input order;
/// the order of groups is unspecified.
pub fn group_by_user(items: Vec<CareItem>) -> HashMap<String, Vec<CareItem>> {
    let mut grouped: HashMap<String, Vec<CareItem>> = HashMap::new();
    for item in items {
        grouped.entry(item.user_id.clone()).or_default().push(item);
    }
    grouped
}
