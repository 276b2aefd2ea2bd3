use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

/// Pool operational metrics, accumulated across batches.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolMetrics {
    /// Batches started.
    pub batches: u64,
    /// Tasks handed to an execution unit.
    pub tasks_dispatched: u64,
    /// Tasks completed successfully, by payload kind.
    pub tasks_completed: HashMap<String, u64>,
    /// Tasks that reported an error.
    pub tasks_failed: u64,
    /// Average task duration by payload kind.
    pub avg_task_duration: HashMap<String, Duration>,
    /// Highest number of simultaneously busy units seen.
    pub peak_busy_workers: usize,
    /// Busy / total units at the last dispatch or completion (0.0 - 1.0).
    pub worker_utilization: f64,
}

impl PoolMetrics {
    pub fn record_batch(&mut self) {
        self.batches += 1;
    }

    /// Record a dispatch; `busy` includes the unit just dispatched to.
    pub fn record_dispatch(&mut self, busy: usize, size: usize) {
        self.tasks_dispatched += 1;
        self.peak_busy_workers = self.peak_busy_workers.max(busy);
        self.update_utilization(busy, size);
    }

    /// Record a successful task.
    pub fn record_completion(&mut self, kind: &str, duration: Duration, busy: usize, size: usize) {
        *self.tasks_completed.entry(kind.to_string()).or_default() += 1;
        self.update_utilization(busy, size);

        // Update rolling average duration
        let count = self.tasks_completed[kind];
        let prev_avg = self.avg_task_duration.get(kind).copied().unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_task_duration.insert(kind.to_string(), new_avg);
    }

    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
    }

    /// Total successful tasks across all kinds.
    pub fn total_completed(&self) -> u64 {
        self.tasks_completed.values().sum()
    }

    fn update_utilization(&mut self, busy: usize, size: usize) {
        self.worker_utilization = if size == 0 {
            0.0
        } else {
            busy as f64 / size as f64
        };
    }
}
