use std::collections::VecDeque;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::task::{validate_batch, Task, TaskResult};
use crate::types::PoolState;
use crate::worker::WorkerResponse;

use super::WorkerPool;

impl WorkerPool {
    /// Run a batch across the pool and return its results ordered by task id.
    ///
    /// Task ids must be exactly `0..tasks.len()`. Tasks are dispatched in
    /// submission order to whichever unit is idle; completion order does not
    /// matter because each result is placed at its own id. The first task
    /// error rejects the whole batch.
    pub async fn schedule(&mut self, tasks: Vec<Task>) -> Result<Vec<TaskResult>, PoolError> {
        if self.state == PoolState::Terminated {
            return Err(PoolError::Terminated);
        }
        validate_batch(&tasks)?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        // A previously rejected batch may still have tasks running.
        self.settle_previous_batch().await?;

        self.batch += 1;
        self.metrics.record_batch();
        let batch = self.batch;
        let total = tasks.len();
        let mut pending: VecDeque<Task> = tasks.into();
        let mut results: Vec<Option<TaskResult>> = (0..total).map(|_| None).collect();
        let mut in_flight = 0usize;

        self.state = PoolState::Accepting;
        info!(batch, tasks = total, workers = self.size(), "scheduling batch");

        loop {
            in_flight += self.dispatch_idle(batch, &mut pending)?;

            if pending.is_empty() {
                if in_flight == 0 {
                    break;
                }
                self.state = PoolState::Draining;
            }

            let Some(response) = self.next_response().await? else {
                continue;
            };
            if let Some(worker) = self.workers.get_mut(response.worker) {
                worker.mark_idle();
            }
            if response.batch != batch {
                debug!(worker = response.worker, batch = response.batch, "discarding stale result");
                continue;
            }
            in_flight -= 1;

            match response.outcome {
                Ok(result) => {
                    debug!(
                        worker = response.worker,
                        task = result.id,
                        duration_ms = result.duration.as_secs_f64() * 1000.0,
                        "task completed"
                    );
                    let (busy, size) = (self.busy_workers(), self.size());
                    self.metrics
                        .record_completion(response.kind, result.duration, busy, size);
                    let id = result.id;
                    results[id] = Some(result);
                }
                Err(source) => {
                    self.metrics.record_failure();
                    self.state = PoolState::Accepting;
                    warn!(
                        worker = response.worker,
                        task = response.task_id,
                        error = %source,
                        in_flight,
                        "task failed, rejecting batch"
                    );
                    return Err(PoolError::TaskFailed {
                        id: response.task_id,
                        worker: response.worker,
                        source,
                    });
                }
            }
        }

        self.state = PoolState::Accepting;
        info!(batch, tasks = total, "batch complete");
        results
            .into_iter()
            .enumerate()
            .map(|(id, slot)| slot.ok_or(PoolError::MissingResult(id)))
            .collect()
    }

    /// Hand pending tasks, oldest first, to idle units. Returns how many were
    /// dispatched.
    fn dispatch_idle(
        &mut self,
        batch: u64,
        pending: &mut VecDeque<Task>,
    ) -> Result<usize, PoolError> {
        let mut dispatched = 0;
        while !pending.is_empty() {
            let Some(worker) = self.workers.iter_mut().find(|w| !w.is_busy()) else {
                break;
            };
            let Some(task) = pending.pop_front() else {
                break;
            };
            let (worker_id, task_id) = (worker.id(), task.id);
            worker.dispatch(batch, task)?;
            dispatched += 1;

            let (busy, size) = (self.busy_workers(), self.size());
            self.metrics.record_dispatch(busy, size);
            debug!(worker = worker_id, task = task_id, busy, "task dispatched");
        }
        Ok(dispatched)
    }

    /// Wait up to one poll interval for a result. `Ok(None)` means the
    /// interval passed and every busy unit is still alive.
    async fn next_response(&mut self) -> Result<Option<WorkerResponse>, PoolError> {
        let poll = self.config.idle_poll_interval();
        match timeout(poll, self.responses.recv()).await {
            Ok(Some(response)) => Ok(Some(response)),
            Ok(None) => Err(PoolError::WorkerLost(self.first_busy().unwrap_or(0))),
            Err(_) => {
                self.check_liveness()?;
                Ok(None)
            }
        }
    }

    /// Drain results of an earlier, rejected batch until every unit is idle.
    async fn settle_previous_batch(&mut self) -> Result<(), PoolError> {
        while self.busy_workers() > 0 {
            if let Some(response) = self.next_response().await? {
                debug!(
                    worker = response.worker,
                    task = response.task_id,
                    "discarding result from rejected batch"
                );
                if let Some(worker) = self.workers.get_mut(response.worker) {
                    worker.mark_idle();
                }
            }
        }
        Ok(())
    }

    /// A busy unit whose thread has exited will never report back.
    fn check_liveness(&self) -> Result<(), PoolError> {
        match self.workers.iter().find(|w| w.is_busy() && w.has_exited()) {
            Some(worker) => Err(PoolError::WorkerLost(worker.id())),
            None => Ok(()),
        }
    }

    fn first_busy(&self) -> Option<usize> {
        self.workers.iter().find(|w| w.is_busy()).map(|w| w.id())
    }
}
