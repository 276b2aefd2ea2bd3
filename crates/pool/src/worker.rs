//! A single pooled execution unit: one OS thread and its request channel.

use std::thread::JoinHandle;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::error::PoolError;
use crate::execute::execute;
use crate::task::{Task, TaskError, TaskResult};

/// Messages the pool sends to a unit.
#[derive(Debug)]
pub(crate) enum WorkerRequest {
    Run { batch: u64, task: Task },
    Shutdown,
}

/// What a unit sends back after running a task.
#[derive(Debug)]
pub(crate) struct WorkerResponse {
    pub worker: usize,
    pub batch: u64,
    pub task_id: usize,
    pub kind: &'static str,
    pub outcome: Result<TaskResult, TaskError>,
}

/// One execution unit, owned exclusively by its pool.
///
/// `busy` is set on dispatch and cleared when the unit's response is
/// received, so a unit never holds two tasks at once.
#[derive(Debug)]
pub struct PoolWorker {
    id: usize,
    busy: bool,
    dispatched: u64,
    requests: UnboundedSender<WorkerRequest>,
    handle: Option<JoinHandle<()>>,
}

impl PoolWorker {
    /// Spawn the unit's thread. Fails if the OS refuses a new thread.
    pub(crate) fn spawn(
        id: usize,
        responses: UnboundedSender<WorkerResponse>,
    ) -> Result<Self, PoolError> {
        let (requests, inbox) = mpsc::unbounded_channel();
        let handle = std::thread::Builder::new()
            .name(format!("pool-worker-{id}"))
            .spawn(move || worker_loop(id, inbox, responses))
            .map_err(|source| PoolError::Spawn { worker: id, source })?;
        Ok(Self {
            id,
            busy: false,
            dispatched: 0,
            requests,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Tasks dispatched to this unit over its lifetime.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub(crate) fn dispatch(&mut self, batch: u64, task: Task) -> Result<(), PoolError> {
        if self.busy {
            return Err(PoolError::WorkerBusy(self.id));
        }
        self.requests
            .send(WorkerRequest::Run { batch, task })
            .map_err(|_| PoolError::WorkerLost(self.id))?;
        self.busy = true;
        self.dispatched += 1;
        Ok(())
    }

    pub(crate) fn mark_idle(&mut self) {
        self.busy = false;
    }

    /// Whether the unit's thread is gone.
    pub(crate) fn has_exited(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Tell the unit to exit. Idle units are joined; a busy unit is detached
    /// and exits once its current task returns. Returns `true` if joined.
    pub(crate) fn terminate(&mut self) -> bool {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        let Some(handle) = self.handle.take() else {
            return true;
        };
        if self.busy && !handle.is_finished() {
            warn!(worker = self.id, "detaching busy execution unit");
            return false;
        }
        if handle.join().is_err() {
            warn!(worker = self.id, "execution unit panicked");
        }
        true
    }
}

fn worker_loop(
    id: usize,
    mut inbox: UnboundedReceiver<WorkerRequest>,
    responses: UnboundedSender<WorkerResponse>,
) {
    debug!(worker = id, "execution unit started");
    while let Some(request) = inbox.blocking_recv() {
        match request {
            WorkerRequest::Run { batch, task } => {
                let kind = task.payload.kind();
                let task_id = task.id;
                let outcome = execute(&task);
                let response = WorkerResponse {
                    worker: id,
                    batch,
                    task_id,
                    kind,
                    outcome,
                };
                if responses.send(response).is_err() {
                    // Pool dropped its receiver.
                    break;
                }
            }
            WorkerRequest::Shutdown => break,
        }
    }
    debug!(worker = id, "execution unit exited");
}
