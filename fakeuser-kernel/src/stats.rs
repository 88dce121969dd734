use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Totals over a whole replay, logged at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub uptime_seconds: u64,
    pub ticks: u64,
    pub anomalies: u64,
    pub logins_requested: u64,
    pub login_failures: u64,
    pub logouts_requested: u64,
    pub logouts_succeeded: u64,
    pub devices_removed: u64,
    pub sink_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    anomalies: AtomicU64,
    logins_requested: AtomicU64,
    login_failures: AtomicU64,
    logouts_requested: AtomicU64,
    logouts_succeeded: AtomicU64,
    devices_removed: AtomicU64,
    sink_failures: AtomicU64,
}

#[derive(Clone, Debug)]
pub struct ReplayStats {
    start_time: Instant,
    counters: Arc<Counters>,
}

impl Default for ReplayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayStats {
    pub fn new() -> Self {
        Self { start_time: Instant::now(), counters: Arc::new(Counters::default()) }
    }

    pub fn record_tick(&self) {
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self) {
        self.counters.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_logins(&self, requested: usize, failures: usize) {
        self.counters.logins_requested.fetch_add(requested as u64, Ordering::Relaxed);
        self.counters.login_failures.fetch_add(failures as u64, Ordering::Relaxed);
    }

    pub fn record_logouts(&self, requested: usize, succeeded: usize, removed: usize) {
        self.counters.logouts_requested.fetch_add(requested as u64, Ordering::Relaxed);
        self.counters.logouts_succeeded.fetch_add(succeeded as u64, Ordering::Relaxed);
        self.counters.devices_removed.fetch_add(removed as u64, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            ticks: c.ticks.load(Ordering::Relaxed),
            anomalies: c.anomalies.load(Ordering::Relaxed),
            logins_requested: c.logins_requested.load(Ordering::Relaxed),
            login_failures: c.login_failures.load(Ordering::Relaxed),
            logouts_requested: c.logouts_requested.load(Ordering::Relaxed),
            logouts_succeeded: c.logouts_succeeded.load(Ordering::Relaxed),
            devices_removed: c.devices_removed.load(Ordering::Relaxed),
            sink_failures: c.sink_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let stats = ReplayStats::new();
        let other = stats.clone();
        stats.record_tick();
        other.record_logins(10, 2);
        other.record_logouts(3, 1, 3);
        stats.record_anomaly();

        let snap = stats.snapshot();
        assert_eq!(snap.ticks, 1);
        assert_eq!(snap.logins_requested, 10);
        assert_eq!(snap.login_failures, 2);
        assert_eq!(snap.logouts_succeeded, 1);
        assert_eq!(snap.devices_removed, 3);
        assert_eq!(snap.anomalies, 1);
        assert_eq!(snap.sink_failures, 0);
    }
}
