use std::time::Duration;

use runlab_core::PoolSettings;
use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Pool lifecycle: `Initializing → Accepting ⇄ Draining → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolState {
    /// Execution units are being created.
    Initializing,
    /// Idle, or dispatching a batch that still has pending tasks.
    Accepting,
    /// Every task of the batch is dispatched; waiting on the last results.
    Draining,
    /// All units have been told to exit. Terminal.
    Terminated,
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of execution units.
    #[serde(default = "default_size")]
    pub size: usize,
    /// How long `schedule` waits for a result before re-checking unit liveness.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

fn default_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_idle_poll_ms() -> u64 { 10 }

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            size: settings.size,
            idle_poll_ms: settings.idle_poll_ms,
        }
    }
}

impl PoolConfig {
    /// Config for `size` units with the default poll interval.
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.size == 0 {
            return Err(PoolError::InvalidConfig(
                "pool size must be at least 1".into(),
            ));
        }
        if self.idle_poll_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "idle_poll_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
