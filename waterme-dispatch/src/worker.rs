use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing;
use waterme_core::{ActionType, CycleLease, PushProvider, RedisPool, WorkerContext};

use crate::composer::{MessageComposer, TemplateRegistry};
use crate::dispatcher::BatchDispatcher;
use crate::service::{DispatchSettings, ReminderService};
use crate::stats::{DispatchStats, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(StatsSnapshot),
    /// The cycle hit its deadline; counters cover the work done until then.
    TimedOut(StatsSnapshot),
    /// Another cycle was still running, here or on another replica.
    Skipped,
}

struct LeaseTarget {
    pool: RedisPool,
    key: String,
}

/// Runs dispatch cycles on a fixed interval, never two at once.
pub struct DispatchWorker {
    service: Arc<ReminderService>,
    interval: Duration,
    cycle_timeout: Duration,
    lease: Option<LeaseTarget>,
    running: Mutex<()>,
}

impl DispatchWorker {
    pub fn new(service: Arc<ReminderService>, interval: Duration, cycle_timeout: Duration) -> Self {
        Self {
            service,
            interval,
            cycle_timeout,
            lease: None,
            running: Mutex::new(()),
        }
    }

    /// Also take a Redis lease per cycle so replicas do not overlap.
    pub fn with_lease(mut self, pool: RedisPool, key: impl Into<String>) -> Self {
        self.lease = Some(LeaseTarget {
            pool,
            key: key.into(),
        });
        self
    }

    pub fn from_context(
        ctx: &WorkerContext,
        provider: Arc<dyn PushProvider>,
        templates: TemplateRegistry,
    ) -> Self {
        let worker_config = &ctx.config.worker;
        let service = ReminderService::new(
            ctx.store.clone(),
            MessageComposer::new(templates),
            BatchDispatcher::new(provider, worker_config.push_batch_size),
            DispatchSettings::from(worker_config),
        );

        let worker = Self::new(
            Arc::new(service),
            worker_config.interval(),
            worker_config.cycle_timeout(),
        );

        match (&ctx.redis_pool, &ctx.config.redis) {
            (Some(pool), Some(redis)) => worker.with_lease(pool.clone(), redis.cycle_lock_key.clone()),
            _ => worker,
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        self.run_cycle_at(Utc::now()).await
    }

    /// One full cycle with `now` as the reference time for every due and
    /// cooldown check.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleOutcome {
        let Ok(_running) = self.running.try_lock() else {
            tracing::warn!("Previous notification check still running, skipping this tick");
            return CycleOutcome::Skipped;
        };

        let lease = match &self.lease {
            Some(target) => match CycleLease::acquire(&target.pool, &target.key, self.cycle_timeout).await {
                Ok(Some(lease)) => Some(lease),
                Ok(None) => {
                    tracing::info!("Notification check running on another worker, skipping this tick");
                    return CycleOutcome::Skipped;
                }
                Err(e) => {
                    tracing::warn!("Error acquiring cycle lease, continuing with local guard only: {}", e);
                    None
                }
            },
            None => None,
        };

        tracing::info!("========== Starting notification check ==========");
        let started = Instant::now();
        let deadline = started + self.cycle_timeout;
        let stats = DispatchStats::new();

        let all_actions = async {
            for action in ActionType::ALL {
                self.service.process_action(action, now, &stats, deadline).await;
            }
        };
        let timed_out = tokio::time::timeout_at(deadline, all_actions).await.is_err()
            || Instant::now() >= deadline;

        if let Some(lease) = lease {
            if let Err(e) = lease.release().await {
                tracing::warn!("Error releasing cycle lease: {}", e);
            }
        }

        let snapshot = stats.snapshot();
        log_summary(started.elapsed(), &snapshot, timed_out);

        if timed_out {
            CycleOutcome::TimedOut(snapshot)
        } else {
            CycleOutcome::Completed(snapshot)
        }
    }

    /// Ticks every `interval`, starting immediately, until `shutdown`
    /// resolves. A cycle still running at shutdown is aborted.
    pub async fn run_until<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Starting notification worker (interval: {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut current: Option<JoinHandle<CycleOutcome>> = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutting down notification worker");
                    break;
                }
                _ = ticker.tick() => {
                    if current.as_ref().is_some_and(|handle| !handle.is_finished()) {
                        tracing::warn!("Previous notification check still running, skipping this tick");
                        continue;
                    }
                    let worker = self.clone();
                    current = Some(tokio::spawn(async move { worker.run_cycle().await }));
                }
            }
        }

        if let Some(handle) = current {
            handle.abort();
            // Wait for the abort so the cycle guard and lease are dropped on return.
            let _ = handle.await;
        }
    }
}

/// Runs the dispatch loop for `ctx` until `shutdown` resolves.
pub async fn run<F>(
    ctx: WorkerContext,
    provider: Arc<dyn PushProvider>,
    templates: TemplateRegistry,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    Arc::new(DispatchWorker::from_context(&ctx, provider, templates))
        .run_until(shutdown)
        .await
}

fn log_summary(elapsed: Duration, stats: &StatsSnapshot, timed_out: bool) {
    if timed_out {
        tracing::warn!("Notification check timed out after {:?}", elapsed);
    }
    tracing::info!("========== Notification check complete ==========");
    tracing::info!("Duration: {:?}", elapsed);
    tracing::info!("Items checked: {}", stats.items_scanned);
    tracing::info!("Notifications sent: {}", stats.sent);
    tracing::info!("Notifications failed: {}", stats.failed);
    tracing::info!("Users notified: {}", stats.users_notified);
    if let Some(rate) = stats.success_rate() {
        tracing::info!("Success rate: {:.2}%", rate);
    }
    tracing::info!("================================================");
}
