//! Unpooled dispatch: one fresh execution unit per task.
//!
//! Each unit is spawned, handed exactly one task, awaited for exactly one
//! result, and joined, on the error path as well. Useful as a baseline for
//! what the pool saves in thread creation.

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::PoolError;
use crate::execute::execute;
use crate::task::{validate_batch, Task, TaskResult};

/// Run one task on a dedicated, short-lived thread.
pub async fn dispatch_single(task: Task) -> Result<TaskResult, PoolError> {
    task.payload
        .validate()
        .map_err(|e| PoolError::InvalidBatch(format!("task {}: {}", task.id, e)))?;

    let id = task.id;
    let (tx, rx) = oneshot::channel();
    let handle = std::thread::Builder::new()
        .name(format!("oneshot-{id}"))
        .spawn(move || {
            let _ = tx.send(execute(&task));
        })
        .map_err(|source| PoolError::Spawn { worker: id, source })?;
    debug!(task = id, "one-shot unit spawned");

    let outcome = rx.await;

    // The unit has sent (or died); joining only reaps the thread.
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!(task = id, "one-shot unit panicked"),
        Err(e) => warn!(task = id, error = %e, "failed to join one-shot unit"),
    }

    match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(source)) => Err(PoolError::TaskFailed {
            id,
            worker: id,
            source,
        }),
        Err(_) => Err(PoolError::WorkerLost(id)),
    }
}

/// Run every task on its own one-shot unit, at most `concurrency` alive at
/// once. Results are ordered by task id.
///
/// The first failure stops new units from starting and rejects the call, but
/// only after every unit already started has reported and been joined.
pub async fn dispatch_many(
    tasks: Vec<Task>,
    concurrency: usize,
) -> Result<Vec<TaskResult>, PoolError> {
    if concurrency == 0 {
        return Err(PoolError::InvalidConfig(
            "concurrency must be at least 1".into(),
        ));
    }
    validate_batch(&tasks)?;

    let total = tasks.len();
    let mut pending = tasks.into_iter();
    let mut running = FuturesUnordered::new();
    let mut results = Vec::with_capacity(total);
    let mut first_error: Option<PoolError> = None;

    loop {
        while first_error.is_none() && running.len() < concurrency {
            let Some(task) = pending.next() else {
                break;
            };
            running.push(dispatch_single(task));
        }
        match running.next().await {
            Some(Ok(result)) => results.push(result),
            Some(Err(e)) => {
                if first_error.is_none() {
                    warn!(
                        error = %e,
                        in_flight = running.len(),
                        "one-shot task failed, draining"
                    );
                    first_error = Some(e);
                }
            }
            None => break,
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    results.sort_by_key(|r| r.id);
    Ok(results)
}
