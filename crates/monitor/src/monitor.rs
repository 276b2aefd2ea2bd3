use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use runlab_core::MonitorSettings;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::MonitorError;
use crate::session::{LagSample, LagStats, MonitorSession, TickReport};

// ── Config ───────────────────────────────────────────────────────────

/// Lag monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagMonitorConfig {
    /// Tick cadence in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Session ceiling; reaching it is a clean stop.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
    /// Number of samples kept in the rolling window.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_interval_ms() -> u64 { 1000 }
fn default_max_duration_ms() -> u64 { 30_000 }
fn default_history_capacity() -> usize { 100 }

impl Default for LagMonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_duration_ms: default_max_duration_ms(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl From<&MonitorSettings> for LagMonitorConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            interval_ms: settings.sample_interval_ms,
            max_duration_ms: settings.max_duration_ms,
            history_capacity: settings.history_capacity,
        }
    }
}

impl LagMonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.interval_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "interval_ms must be greater than zero".into(),
            ));
        }
        if self.max_duration_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "max_duration_ms must be greater than zero".into(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "history_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// ── Events and reports ───────────────────────────────────────────────

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// `max_duration` elapsed.
    Timeout,
    /// Someone called [`StopHandle::stop`].
    Signal,
}

/// Delivered to the session sink: one `Tick` per tick, then exactly one `Stopped`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MonitorEvent {
    Tick(TickReport),
    Stopped(StopReason),
}

/// Summary handed back when a session ends.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub stop_reason: StopReason,
    pub ticks: u64,
    /// The rolling window at stop time, oldest first.
    pub samples: Vec<LagSample>,
    pub stats: Option<LagStats>,
    pub uptime: Duration,
}

// ── Stop signal ──────────────────────────────────────────────────────

/// Cloneable stop signal for one session. Stopping twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` only for the call that flipped the flag.
    pub fn stop(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        // notify_one stores a permit, so a stop issued mid-tick is not lost.
        self.notify.notify_one();
        true
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    async fn notified(&self) {
        self.notify.notified().await
    }
}

// ── LagMonitor ───────────────────────────────────────────────────────

/// Set while any session runs in this process.
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Releases the process-wide session slot and the monitor's own flag when a
/// session ends, panics included.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Periodic sampler measuring how late the runtime wakes a recurring timer.
///
/// At most one session runs in the whole process at any time, across every
/// `LagMonitor` instance.
#[derive(Debug)]
pub struct LagMonitor {
    config: LagMonitorConfig,
    active: Arc<AtomicBool>,
}

impl LagMonitor {
    pub fn new(config: LagMonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            config,
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &LagMonitorConfig {
        &self.config
    }

    /// Whether a session is currently running on this monitor.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether any monitor in this process is running a session.
    pub fn session_in_progress() -> bool {
        SESSION_ACTIVE.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> Result<ActiveGuard, MonitorError> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MonitorError::AlreadyRunning)?;
        self.active.store(true, Ordering::SeqCst);
        Ok(ActiveGuard(Arc::clone(&self.active)))
    }

    /// Spawn a session on the current tokio runtime.
    ///
    /// Events are pushed to `sink` from the session task. A panic in the
    /// sink ends that session only; it surfaces from [`MonitorHandle::wait`].
    pub fn start<F>(&self, sink: F) -> Result<MonitorHandle, MonitorError>
    where
        F: FnMut(MonitorEvent) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MonitorError::NoRuntime(e.to_string()))?;
        let guard = self.acquire()?;
        let stop = StopHandle::new();
        let config = self.config.clone();
        let session_stop = stop.clone();
        let task = runtime.spawn(async move {
            let _guard = guard;
            run_session(&config, &session_stop, sink).await
        });
        Ok(MonitorHandle { stop, task })
    }

    /// Run a session on the current task until it stops.
    pub async fn run<F>(&self, stop: &StopHandle, sink: F) -> Result<MonitorReport, MonitorError>
    where
        F: FnMut(MonitorEvent),
    {
        let _guard = self.acquire()?;
        Ok(run_session(&self.config, stop, sink).await)
    }
}

/// A session spawned by [`LagMonitor::start`].
#[derive(Debug)]
pub struct MonitorHandle {
    stop: StopHandle,
    task: JoinHandle<MonitorReport>,
}

impl MonitorHandle {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Shorthand for `stop_handle().stop()`.
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    /// Wait for the session to finish.
    pub async fn wait(self) -> Result<MonitorReport, MonitorError> {
        self.task
            .await
            .map_err(|e| MonitorError::SessionAborted(e.to_string()))
    }
}

async fn run_session<F>(config: &LagMonitorConfig, stop: &StopHandle, mut sink: F) -> MonitorReport
where
    F: FnMut(MonitorEvent),
{
    let interval = config.interval();
    let start = Instant::now();
    let mut session = MonitorSession::new(start, interval, config.history_capacity);

    let deadline = tokio::time::sleep(config.max_duration());
    tokio::pin!(deadline);

    info!(
        interval_ms = config.interval_ms,
        max_duration_ms = config.max_duration_ms,
        "lag monitor started"
    );

    let reason = loop {
        if stop.is_stop_requested() {
            break StopReason::Signal;
        }
        tokio::select! {
            biased;
            _ = stop.notified() => break StopReason::Signal,
            _ = &mut deadline => break StopReason::Timeout,
            // Re-armed from the moment the previous tick ran.
            _ = tokio::time::sleep(interval) => {
                let report = session.record_tick(Instant::now());
                debug!(
                    tick = report.tick,
                    lag_ms = report.lag_ms,
                    avg_lag_ms = report.avg_lag_ms,
                    "lag sample"
                );
                sink(MonitorEvent::Tick(report));
            }
        }
    };

    session.stop();
    let report = MonitorReport {
        stop_reason: reason,
        ticks: session.ticks(),
        samples: session.history().to_vec(),
        stats: session.stats(),
        uptime: start.elapsed(),
    };
    info!(
        reason = ?reason,
        ticks = report.ticks,
        max_lag_ms = report.stats.map(|s| s.max_ms).unwrap_or(0.0),
        "lag monitor stopped"
    );
    sink(MonitorEvent::Stopped(reason));
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = LagMonitorConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.max_duration(), Duration::from_secs(30));
        assert_eq!(config.history_capacity, 100);
    }

    #[test]
    fn config_from_partial_json() {
        let config: LagMonitorConfig = serde_json::from_str(r#"{"interval_ms": 16}"#).unwrap();
        assert_eq!(config.interval_ms, 16);
        assert_eq!(config.max_duration_ms, 30_000);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = LagMonitorConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            LagMonitor::new(config),
            Err(MonitorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn start_outside_runtime_fails() {
        let monitor = LagMonitor::new(LagMonitorConfig::default()).unwrap();
        let result = monitor.start(|_| {});
        assert!(matches!(result, Err(MonitorError::NoRuntime(_))));
        assert!(!monitor.is_active());
    }

    #[test]
    fn stop_handle_is_idempotent() {
        let stop = StopHandle::new();
        assert!(stop.stop());
        assert!(!stop.stop());
        assert!(stop.is_stop_requested());
    }
}
