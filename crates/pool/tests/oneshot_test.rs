//! Teardown of one-shot units when a batch is rejected.
//!
//! Kept in its own test binary with a single test, so the thread listing
//! only ever sees units started here.

use std::time::{Duration, Instant};

use runlab_pool::{dispatch_many, PoolError, Task, TaskPayload};

#[cfg(target_os = "linux")]
fn live_unit_threads() -> Vec<String> {
    let Ok(entries) = std::fs::read_dir("/proc/self/task") else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| std::fs::read_to_string(entry.path().join("comm")).ok())
        .map(|name| name.trim().to_string())
        .filter(|name| name.starts_with("oneshot-"))
        .collect()
}

#[tokio::test]
async fn rejected_batch_joins_every_started_unit() {
    let tasks = Task::batch([
        TaskPayload::Sleep {
            millis: 300,
            value: 0.0,
        },
        TaskPayload::Fail {
            reason: "middle task fails".into(),
        },
        TaskPayload::Sleep {
            millis: 300,
            value: 2.0,
        },
    ]);

    let started = Instant::now();
    let err = dispatch_many(tasks, 3).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, PoolError::TaskFailed { id: 1, .. }));
    // The sleeping siblings were waited for, not abandoned.
    assert!(elapsed >= Duration::from_millis(300), "returned after {elapsed:?}");

    #[cfg(target_os = "linux")]
    {
        let alive = live_unit_threads();
        assert!(alive.is_empty(), "units still running: {alive:?}");
    }
}
