use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one dispatch cycle. Shared by concurrently processed users,
/// hence atomics.
#[derive(Debug, Default)]
pub struct DispatchStats {
    items_scanned: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    users_notified: AtomicU64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scanned(&self, n: usize) {
        self.items_scanned.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, n: usize) {
        self.sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, n: usize) {
        self.failed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_user_notified(&self) {
        self.users_notified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            items_scanned: self.items_scanned.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            users_notified: self.users_notified.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub items_scanned: u64,
    pub sent: u64,
    pub failed: u64,
    pub users_notified: u64,
}

impl StatsSnapshot {
    /// Percentage of delivered notifications; `None` when nothing was sent.
    pub fn success_rate(&self) -> Option<f64> {
        if self.sent == 0 {
            return None;
        }
        Some(self.sent as f64 / (self.sent + self.failed) as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_omitted_without_sends() {
        let stats = DispatchStats::new();
        stats.record_failed(3);
        assert_eq!(stats.snapshot().success_rate(), None);

        stats.record_sent(1);
        let rate = stats.snapshot().success_rate().unwrap();
        assert!((rate - 25.0).abs() < f64::EPSILON);
    }
}
