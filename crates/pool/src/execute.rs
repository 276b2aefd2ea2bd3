//! Payload execution, shared by pooled workers and one-shot units.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::task::{Task, TaskError, TaskPayload, TaskResult};

/// Run a task on the calling thread. Panics are caught and reported as
/// [`TaskError::Panicked`].
pub fn execute(task: &Task) -> Result<TaskResult, TaskError> {
    let start = Instant::now();
    let value = panic::catch_unwind(AssertUnwindSafe(|| run_payload(&task.payload)))
        .map_err(|payload| TaskError::Panicked(panic_message(payload)))??;
    Ok(TaskResult {
        id: task.id,
        value,
        duration: start.elapsed(),
    })
}

fn run_payload(payload: &TaskPayload) -> Result<f64, TaskError> {
    payload.validate()?;
    match payload {
        TaskPayload::Fibonacci { n } => Ok(fibonacci(*n) as f64),
        TaskPayload::SumOfSquares { n } => Ok(sum_of_squares(*n)),
        TaskPayload::CountPrimes { limit } => Ok(count_primes(*limit) as f64),
        TaskPayload::Sleep { millis, value } => {
            std::thread::sleep(Duration::from_millis(*millis));
            Ok(*value)
        }
        TaskPayload::Fail { reason } => Err(TaskError::Failed(reason.clone())),
    }
}

fn fibonacci(n: u32) -> u64 {
    if n < 2 {
        n as u64
    } else {
        fibonacci(n - 1) + fibonacci(n - 2)
    }
}

fn sum_of_squares(n: u64) -> f64 {
    (0..n).map(|i| (i as f64) * (i as f64)).sum()
}

fn count_primes(limit: u64) -> u64 {
    (2..limit).filter(|&candidate| is_prime(candidate)).count() as u64
}

fn is_prime(n: u64) -> bool {
    if n < 4 {
        return n >= 2;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
