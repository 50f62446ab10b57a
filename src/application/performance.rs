use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// Receives the elapsed time of every command the `AppState` runs.
pub trait OperationObserver: Send + Sync {
    fn record(&self, operation: &str, elapsed: Duration);
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl OperationObserver for NoopObserver {
    fn record(&self, _operation: &str, _elapsed: Duration) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationStats {
    pub count: u64,
    pub slow_count: u64,
    pub total_ms: u128,
    pub max_ms: u128,
}

/// Per-operation timings, collected only between `start()` and `stop()`.
#[derive(Debug)]
pub struct PerformanceMonitor {
    slow_threshold: Duration,
    running: AtomicBool,
    stats: Mutex<BTreeMap<String, OperationStats>>,
}

impl PerformanceMonitor {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            slow_threshold,
            running: AtomicBool::new(false),
            stats: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    pub fn snapshot(&self) -> BTreeMap<String, OperationStats> {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reset(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.clear();
        }
    }
}

impl OperationObserver for PerformanceMonitor {
    fn record(&self, operation: &str, elapsed: Duration) {
        if !self.is_running() {
            return;
        }

        let elapsed_ms = elapsed.as_millis();
        let slow = elapsed > self.slow_threshold;
        if slow {
            warn!(
                operation,
                elapsed_ms = elapsed_ms as u64,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                "slow operation"
            );
        }

        let Ok(mut stats) = self.stats.lock() else {
            return;
        };
        let entry = stats.entry(operation.to_string()).or_default();
        entry.count += 1;
        entry.total_ms += elapsed_ms;
        entry.max_ms = entry.max_ms.max(elapsed_ms);
        if slow {
            entry.slow_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_only_while_running() {
        let monitor = PerformanceMonitor::new(Duration::from_millis(50));
        monitor.record("list_time_blocks", Duration::from_millis(5));
        assert!(monitor.snapshot().is_empty());

        monitor.start();
        monitor.record("list_time_blocks", Duration::from_millis(5));
        monitor.record("list_time_blocks", Duration::from_millis(80));
        monitor.record("weekly_hours", Duration::from_millis(1));
        monitor.stop();
        monitor.record("weekly_hours", Duration::from_millis(1));

        let snapshot = monitor.snapshot();
        assert_eq!(
            snapshot.get("list_time_blocks"),
            Some(&OperationStats {
                count: 2,
                slow_count: 1,
                total_ms: 85,
                max_ms: 80,
            })
        );
        assert_eq!(snapshot.get("weekly_hours").map(|stats| stats.count), Some(1));
    }

    #[test]
    fn reset_clears_collected_stats() {
        let monitor = PerformanceMonitor::new(Duration::from_millis(50));
        monitor.start();
        monitor.record("weekly_hours", Duration::from_millis(1));
        monitor.reset();
        assert!(monitor.snapshot().is_empty());
        assert!(monitor.is_running());
    }
}
