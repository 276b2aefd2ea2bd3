use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::window::RingBuffer;

/// One lag measurement, taken once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LagSample {
    /// Milliseconds since the session started (monotonic clock).
    pub timestamp_ms: f64,
    /// Actual minus expected wake-up time. Negative when a tick fired early.
    pub lag_ms: f64,
}

/// Rolling statistics over the sample window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LagStats {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub samples: usize,
}

impl LagStats {
    /// Summarize a set of samples. `None` when there are none.
    pub fn over<'a>(samples: impl IntoIterator<Item = &'a LagSample>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for sample in samples {
            count += 1;
            sum += sample.lag_ms;
            min = min.min(sample.lag_ms);
            max = max.max(sample.lag_ms);
        }
        if count == 0 {
            return None;
        }
        Some(Self {
            avg_ms: sum / count as f64,
            min_ms: min,
            max_ms: max,
            samples: count,
        })
    }
}

/// What a single tick exposes to the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickReport {
    /// 1-based tick number within the session.
    pub tick: u64,
    pub lag_ms: f64,
    pub avg_lag_ms: f64,
    pub min_lag_ms: f64,
    pub max_lag_ms: f64,
    pub uptime: Duration,
}

/// State of one monitoring run.
///
/// `running` goes from true to false exactly once. The session is thrown
/// away when the run ends.
#[derive(Debug)]
pub struct MonitorSession {
    running: bool,
    start_time: Instant,
    last_tick: Instant,
    interval: Duration,
    ticks: u64,
    history: RingBuffer<LagSample>,
}

impl MonitorSession {
    pub fn new(start_time: Instant, interval: Duration, history_capacity: usize) -> Self {
        Self {
            running: true,
            start_time,
            last_tick: start_time,
            interval,
            ticks: 0,
            history: RingBuffer::new(history_capacity),
        }
    }

    /// Record a tick that fired at `now`.
    ///
    /// The next expected wake-up is measured from `now`, not from the
    /// previous expected time, so lag never accumulates across ticks.
    pub fn record_tick(&mut self, now: Instant) -> TickReport {
        let expected = self.last_tick + self.interval;
        let lag_ms = signed_millis(now, expected);
        self.ticks += 1;
        self.history.push(LagSample {
            timestamp_ms: now.saturating_duration_since(self.start_time).as_secs_f64() * 1000.0,
            lag_ms,
        });
        self.last_tick = now;

        // The window holds at least the sample just pushed unless capacity is 0.
        let stats = LagStats::over(self.history.iter()).unwrap_or(LagStats {
            avg_ms: lag_ms,
            min_ms: lag_ms,
            max_ms: lag_ms,
            samples: 0,
        });
        TickReport {
            tick: self.ticks,
            lag_ms,
            avg_lag_ms: stats.avg_ms,
            min_lag_ms: stats.min_ms,
            max_lag_ms: stats.max_ms,
            uptime: now.saturating_duration_since(self.start_time),
        }
    }

    /// Mark the session stopped. Returns `false` if it already was.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn history(&self) -> &RingBuffer<LagSample> {
        &self.history
    }

    pub fn stats(&self) -> Option<LagStats> {
        LagStats::over(self.history.iter())
    }
}

fn signed_millis(actual: Instant, expected: Instant) -> f64 {
    match actual.checked_duration_since(expected) {
        Some(late) => late.as_secs_f64() * 1000.0,
        None => -(expected.duration_since(actual).as_secs_f64() * 1000.0),
    }
}
