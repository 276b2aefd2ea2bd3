use thiserror::Error;

use crate::task::TaskError;

/// Errors raised by the worker pool, one-shot dispatch and shared-memory processing.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool config: {0}")]
    InvalidConfig(String),

    #[error("invalid task batch: {0}")]
    InvalidBatch(String),

    #[error("failed to spawn execution unit {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("task {id} failed on worker {worker}: {source}")]
    TaskFailed {
        id: usize,
        worker: usize,
        #[source]
        source: TaskError,
    },

    #[error("worker {0} exited without reporting a result")]
    WorkerLost(usize),

    #[error("worker {0} is already busy")]
    WorkerBusy(usize),

    #[error("no result recorded for task {0}")]
    MissingResult(usize),

    #[error("pool has been terminated")]
    Terminated,

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
