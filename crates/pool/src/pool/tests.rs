use std::time::Duration;

use crate::error::PoolError;
use crate::pool::WorkerPool;
use crate::task::{Task, TaskPayload};
use crate::types::{PoolConfig, PoolState};

fn sleep(millis: u64, value: f64) -> TaskPayload {
    TaskPayload::Sleep { millis, value }
}

#[test]
fn initialize_creates_idle_workers() {
    let pool = WorkerPool::with_size(3).unwrap();
    assert_eq!(pool.size(), 3);
    assert_eq!(pool.state(), PoolState::Accepting);
    assert_eq!(pool.idle_workers(), 3);
    assert!(pool.workers().iter().all(|w| !w.is_busy()));
}

#[test]
fn zero_sized_pool_is_rejected() {
    assert!(matches!(
        WorkerPool::with_size(0),
        Err(PoolError::InvalidConfig(_))
    ));
}

#[test]
fn cleanup_is_idempotent() {
    let mut pool = WorkerPool::with_size(2).unwrap();
    pool.cleanup();
    assert_eq!(pool.state(), PoolState::Terminated);
    assert_eq!(pool.size(), 0);
    pool.cleanup();
    assert_eq!(pool.state(), PoolState::Terminated);
}

#[tokio::test]
async fn schedule_after_cleanup_is_refused() {
    let mut pool = WorkerPool::with_size(1).unwrap();
    pool.cleanup();
    let result = pool.schedule(Task::batch([sleep(0, 1.0)])).await;
    assert!(matches!(result, Err(PoolError::Terminated)));
}

#[tokio::test]
async fn empty_batch_returns_immediately() {
    let mut pool = WorkerPool::with_size(1).unwrap();
    let results = pool.schedule(Vec::new()).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(pool.metrics().batches, 0);
}

#[tokio::test]
async fn every_worker_is_idle_after_a_batch() {
    let mut pool = WorkerPool::with_size(2).unwrap();
    let tasks = Task::batch((0..5).map(|i| sleep(5, i as f64)));
    pool.schedule(tasks).await.unwrap();

    assert_eq!(pool.busy_workers(), 0);
    assert_eq!(pool.state(), PoolState::Accepting);
    let dispatched: u64 = pool.workers().iter().map(|w| w.dispatched()).sum();
    assert_eq!(dispatched, 5);
}

#[tokio::test]
async fn rejected_batch_leftovers_are_discarded_before_next_batch() {
    let mut pool = WorkerPool::initialize(PoolConfig {
        size: 2,
        idle_poll_ms: 5,
    })
    .unwrap();

    // Task 0 fails fast while task 1 is still sleeping on the other unit.
    let tasks = vec![
        Task::new(
            0,
            TaskPayload::Fail {
                reason: "bad input".into(),
            },
        ),
        Task::new(1, sleep(80, 99.0)),
    ];
    let err = pool.schedule(tasks).await.unwrap_err();
    assert!(matches!(err, PoolError::TaskFailed { id: 0, .. }));
    assert_eq!(pool.busy_workers(), 1);

    // The late result from task 1 must not leak into this batch.
    let results = pool
        .schedule(Task::batch([sleep(0, 1.0), sleep(0, 2.0)]))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].value, 1.0);
    assert_eq!(results[1].value, 2.0);
    assert_eq!(pool.busy_workers(), 0);
}

#[tokio::test]
async fn invalid_batch_is_rejected_before_dispatch() {
    let mut pool = WorkerPool::with_size(2).unwrap();
    let tasks = vec![Task::new(1, sleep(0, 0.0))];
    let err = pool.schedule(tasks).await.unwrap_err();
    assert!(matches!(err, PoolError::InvalidBatch(_)));
    assert_eq!(pool.metrics().tasks_dispatched, 0);
}

#[tokio::test]
async fn drop_terminates_busy_pool_without_hanging() {
    let mut pool = WorkerPool::with_size(1).unwrap();
    let schedule = pool.schedule(Task::batch([sleep(200, 0.0)]));
    // Abandon the batch mid-flight.
    let _ = tokio::time::timeout(Duration::from_millis(20), schedule).await;
    assert_eq!(pool.busy_workers(), 1);

    let started = std::time::Instant::now();
    drop(pool);
    assert!(started.elapsed() < Duration::from_millis(150));
}
