use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::StoreError;
use crate::store::ReminderStore;
use crate::types::{ActionType, CareItem, NotificationConfig};

#[derive(Debug, Clone, Copy)]
struct CareSchedule {
    interval_days: u32,
    last_done: Option<DateTime<Utc>>,
}

/// A plant as the in-memory store sees it: identity plus one schedule
/// per action type it takes part in.
#[derive(Debug, Clone)]
pub struct PlantRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    schedules: BTreeMap<ActionType, CareSchedule>,
}

impl PlantRecord {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name: name.into(),
            created_at,
            schedules: BTreeMap::new(),
        }
    }

    /// `last_done = None` counts from `created_at`.
    pub fn with_schedule(
        mut self,
        action: ActionType,
        interval_days: u32,
        last_done: Option<DateTime<Utc>>,
    ) -> Self {
        self.schedules.insert(
            action,
            CareSchedule {
                interval_days,
                last_done,
            },
        );
        self
    }

    fn due_since(&self, action: ActionType, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let schedule = self.schedules.get(&action)?;
        if schedule.interval_days == 0 {
            return None;
        }
        let base = schedule.last_done.unwrap_or(self.created_at);
        let due_at = base + Duration::days(i64::from(schedule.interval_days));
        (due_at <= now).then_some(base)
    }
}

#[derive(Default)]
struct MemoryState {
    plants: Vec<PlantRecord>,
    configs: HashMap<String, NotificationConfig>,
    failing_scans: HashSet<ActionType>,
    fail_reads: bool,
    fail_updates: bool,
    updates: usize,
}

/// In-process [`ReminderStore`] with the same due semantics as
/// [`crate::PgStore`]. Failures can be switched on per operation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_plant(&self, plant: PlantRecord) {
        self.state.lock().plants.push(plant);
    }

    pub fn put_config(&self, config: NotificationConfig) {
        self.state.lock().configs.insert(config.user_id.clone(), config);
    }

    pub fn config(&self, user_id: &str) -> Option<NotificationConfig> {
        self.state.lock().configs.get(user_id).cloned()
    }

    pub fn fail_scans_for(&self, action: ActionType) {
        self.state.lock().failing_scans.insert(action);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.state.lock().fail_updates = fail;
    }

    /// Number of successful config updates so far.
    pub fn update_count(&self) -> usize {
        self.state.lock().updates
    }
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn scan_due(
        &self,
        action: ActionType,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<CareItem>, StoreError> {
        let state = self.state.lock();
        if state.failing_scans.contains(&action) {
            return Err(StoreError::Unavailable(format!("scan for {} disabled", action)));
        }

        let mut due: Vec<(DateTime<Utc>, &PlantRecord)> = state
            .plants
            .iter()
            .filter_map(|p| p.due_since(action, now).map(|since| (since, p)))
            .collect();
        due.sort_by_key(|(since, _)| *since);

        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(due
            .into_iter()
            .take(limit)
            .map(|(_, p)| CareItem::new(&p.id, &p.user_id, &p.name))
            .collect())
    }

    async fn get_notification_config(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationConfig>, StoreError> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(StoreError::Unavailable("config reads disabled".to_string()));
        }
        Ok(state.configs.get(user_id).cloned())
    }

    async fn create_notification_config(
        &self,
        config: NotificationConfig,
    ) -> Result<NotificationConfig, StoreError> {
        let mut state = self.state.lock();
        let stored = state
            .configs
            .entry(config.user_id.clone())
            .or_insert(config);
        Ok(stored.clone())
    }

    async fn update_notification_config(
        &self,
        config: NotificationConfig,
    ) -> Result<NotificationConfig, StoreError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.fail_updates {
            return Err(StoreError::Unavailable("config updates disabled".to_string()));
        }
        match state.configs.get_mut(&config.user_id) {
            Some(slot) => {
                *slot = config.clone();
                state.updates += 1;
                Ok(config)
            }
            None => Err(StoreError::NotFound(config.user_id)),
        }
    }
}
