use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Largest `n` accepted for the (deliberately naive) recursive Fibonacci.
pub const MAX_FIBONACCI_N: u32 = 45;

/// Error type for a single task's execution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// The work a task asks an execution unit to do.
///
/// Dispatched by exhaustive match inside the unit; there is no string tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Naive recursive Fibonacci.
    Fibonacci { n: u32 },
    /// Sum of i² for i in 0..n.
    SumOfSquares { n: u64 },
    /// Number of primes below `limit`, by trial division.
    CountPrimes { limit: u64 },
    /// Park the unit for `millis`, then return `value`. Simulates latency.
    Sleep { millis: u64, value: f64 },
    /// Always fails with `reason`.
    Fail { reason: String },
}

impl TaskPayload {
    /// Short name used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::Fibonacci { .. } => "fibonacci",
            TaskPayload::SumOfSquares { .. } => "sum_of_squares",
            TaskPayload::CountPrimes { .. } => "count_primes",
            TaskPayload::Sleep { .. } => "sleep",
            TaskPayload::Fail { .. } => "fail",
        }
    }

    /// Reject payloads that could not finish in reasonable time.
    pub fn validate(&self) -> Result<(), TaskError> {
        match self {
            TaskPayload::Fibonacci { n } if *n > MAX_FIBONACCI_N => Err(TaskError::InvalidPayload(
                format!("fibonacci n={n} exceeds {MAX_FIBONACCI_N}"),
            )),
            TaskPayload::Sleep { value, .. } if !value.is_finite() => Err(
                TaskError::InvalidPayload("sleep value must be finite".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// A unit of CPU-bound work. `id` is unique within its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: usize,
    pub payload: TaskPayload,
}

impl Task {
    pub fn new(id: usize, payload: TaskPayload) -> Self {
        Self { id, payload }
    }

    /// Build a batch with ids `0..payloads.len()` in order.
    pub fn batch(payloads: impl IntoIterator<Item = TaskPayload>) -> Vec<Task> {
        payloads
            .into_iter()
            .enumerate()
            .map(|(id, payload)| Task::new(id, payload))
            .collect()
    }
}

/// Result of executing a task, matched back to it by `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub id: usize,
    pub value: f64,
    pub duration: Duration,
}

/// Check that ids form a permutation of `0..len` and every payload is valid.
pub(crate) fn validate_batch(tasks: &[Task]) -> Result<(), PoolError> {
    let mut seen = vec![false; tasks.len()];
    for task in tasks {
        match seen.get_mut(task.id) {
            None => {
                return Err(PoolError::InvalidBatch(format!(
                    "task id {} is out of range for a batch of {}",
                    task.id,
                    tasks.len()
                )))
            }
            Some(slot) if *slot => {
                return Err(PoolError::InvalidBatch(format!(
                    "task id {} appears more than once",
                    task.id
                )))
            }
            Some(slot) => *slot = true,
        }
        task.payload.validate().map_err(|e| {
            PoolError::InvalidBatch(format!("task {}: {}", task.id, e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_numbers_tasks_in_order() {
        let tasks = Task::batch([
            TaskPayload::Fibonacci { n: 10 },
            TaskPayload::SumOfSquares { n: 3 },
        ]);
        assert_eq!(tasks[0].id, 0);
        assert_eq!(tasks[1].id, 1);
        assert!(validate_batch(&tasks).is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let tasks = vec![
            Task::new(0, TaskPayload::SumOfSquares { n: 1 }),
            Task::new(0, TaskPayload::SumOfSquares { n: 1 }),
        ];
        assert!(matches!(validate_batch(&tasks), Err(PoolError::InvalidBatch(_))));
    }

    #[test]
    fn out_of_range_id_is_rejected() {
        let tasks = vec![Task::new(5, TaskPayload::SumOfSquares { n: 1 })];
        assert!(matches!(validate_batch(&tasks), Err(PoolError::InvalidBatch(_))));
    }

    #[test]
    fn oversized_fibonacci_is_rejected() {
        let payload = TaskPayload::Fibonacci { n: 90 };
        assert!(matches!(payload.validate(), Err(TaskError::InvalidPayload(_))));
    }

    #[test]
    fn payload_json_is_tagged_by_kind() {
        let json = serde_json::to_value(TaskPayload::CountPrimes { limit: 100 }).unwrap();
        assert_eq!(json["kind"], "count_primes");
        assert_eq!(json["limit"], 100);
        let back: TaskPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, TaskPayload::CountPrimes { limit: 100 });
    }
}
