use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::info;

use crate::error::PoolError;
use crate::metrics::PoolMetrics;
use crate::types::{PoolConfig, PoolState};
use crate::worker::{PoolWorker, WorkerResponse};

/// A fixed set of execution units fed from a FIFO task queue.
///
/// The pool is the only owner of its units and their `busy` flags; every
/// mutation goes through `&mut self`. Units are torn down by
/// [`cleanup`](WorkerPool::cleanup) or, failing that, on drop.
#[derive(Debug)]
pub struct WorkerPool {
    pub(super) config: PoolConfig,
    pub(super) workers: Vec<PoolWorker>,
    /// Results from every unit. Only units hold senders.
    pub(super) responses: UnboundedReceiver<WorkerResponse>,
    pub(super) state: PoolState,
    /// Sequence number of the most recent batch.
    pub(super) batch: u64,
    pub(super) metrics: PoolMetrics,
}

impl WorkerPool {
    /// Create `config.size` execution units, all idle.
    ///
    /// If any unit fails to spawn, the ones already created are torn down
    /// and the error is returned. There is no partial pool.
    pub fn initialize(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let (tx, responses) = mpsc::unbounded_channel();
        let mut pool = Self {
            workers: Vec::with_capacity(config.size),
            config,
            responses,
            state: PoolState::Initializing,
            batch: 0,
            metrics: PoolMetrics::default(),
        };

        for id in 0..pool.config.size {
            // On error `pool` is dropped here, which terminates what exists.
            let worker = PoolWorker::spawn(id, tx.clone())?;
            pool.workers.push(worker);
        }

        pool.state = PoolState::Accepting;
        info!(
            workers = pool.config.size,
            idle_poll_ms = pool.config.idle_poll_ms,
            "worker pool initialized"
        );
        Ok(pool)
    }

    /// Shorthand for a pool of `size` units with default settings.
    pub fn with_size(size: usize) -> Result<Self, PoolError> {
        Self::initialize(PoolConfig::with_size(size))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of live execution units (0 once terminated).
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    pub fn workers(&self) -> &[PoolWorker] {
        &self.workers
    }

    pub fn busy_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_busy()).count()
    }

    pub fn idle_workers(&self) -> usize {
        self.size() - self.busy_workers()
    }

    /// Terminate every execution unit, busy or not. Idempotent.
    pub fn cleanup(&mut self) {
        if self.state == PoolState::Terminated {
            return;
        }
        let total = self.workers.len();
        let detached = self
            .workers
            .iter_mut()
            .map(|w| w.terminate())
            .filter(|joined| !joined)
            .count();
        self.workers.clear();
        self.state = PoolState::Terminated;
        info!(workers = total, detached, "worker pool terminated");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cleanup();
    }
}
