//! Integration tests for lag monitor sessions.
//!
//! Exact tick counts are asserted on a paused clock; the blocking tests run
//! on a real current-thread runtime so the stall is genuine. Only one session
//! may run per process, so every test that starts one holds `SESSION_LOCK`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use runlab_monitor::{
    run_blocking_demo, BlockingMode, LagMonitor, LagMonitorConfig, MonitorError, MonitorEvent,
    StopHandle, StopReason,
};

static SESSION_LOCK: Mutex<()> = Mutex::new(());

fn exclusive() -> MutexGuard<'static, ()> {
    SESSION_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

fn config(interval_ms: u64, max_duration_ms: u64) -> LagMonitorConfig {
    LagMonitorConfig {
        interval_ms,
        max_duration_ms,
        history_capacity: 100,
    }
}

fn collecting_sink() -> (Arc<Mutex<Vec<MonitorEvent>>>, impl FnMut(MonitorEvent) + Send + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    (events, move |event| sink_events.lock().unwrap().push(event))
}

#[tokio::test(start_paused = true)]
async fn hundred_ms_session_at_16ms_records_six_samples() {
    let _session = exclusive();
    let monitor = LagMonitor::new(config(16, 100)).unwrap();
    let (events, sink) = collecting_sink();

    let handle = monitor.start(sink).unwrap();
    assert!(monitor.is_active());
    let report = handle.wait().await.unwrap();

    assert_eq!(report.stop_reason, StopReason::Timeout);
    assert!((5..=7).contains(&report.samples.len()), "got {}", report.samples.len());
    assert_eq!(report.ticks, 6);
    assert!(!monitor.is_active());

    let events = events.lock().unwrap();
    let ticks = events
        .iter()
        .filter(|e| matches!(e, MonitorEvent::Tick(_)))
        .count();
    assert_eq!(ticks, 6);
    assert_eq!(events.last(), Some(&MonitorEvent::Stopped(StopReason::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn paused_clock_ticks_have_no_lag() {
    let _session = exclusive();
    let monitor = LagMonitor::new(config(10, 55)).unwrap();
    let report = monitor.run(&StopHandle::new(), |_| {}).await.unwrap();

    let stats = report.stats.expect("samples were recorded");
    assert_eq!(stats.max_ms, 0.0);
    assert_eq!(stats.min_ms, 0.0);
    assert_eq!(report.samples.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn window_is_capped_and_drops_oldest() {
    let _session = exclusive();
    let monitor = LagMonitor::new(LagMonitorConfig {
        interval_ms: 1,
        max_duration_ms: 150,
        history_capacity: 100,
    })
    .unwrap();
    let report = monitor.run(&StopHandle::new(), |_| {}).await.unwrap();

    assert!(report.ticks > 100);
    assert_eq!(report.samples.len(), 100);
    // Oldest surviving sample is tick (ticks - 99), stamped at that many ms.
    let oldest = report.samples.first().unwrap();
    assert!((oldest.timestamp_ms - (report.ticks - 99) as f64).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn external_stop_ends_session_with_signal() {
    let _session = exclusive();
    let monitor = LagMonitor::new(config(10, 30_000)).unwrap();
    let (events, sink) = collecting_sink();
    let handle = monitor.start(sink).unwrap();

    tokio::time::sleep(Duration::from_millis(35)).await;
    assert!(handle.stop());
    // Second stop is a no-op.
    assert!(!handle.stop());

    let report = handle.wait().await.unwrap();
    assert_eq!(report.stop_reason, StopReason::Signal);
    assert_eq!(report.ticks, 3);

    let stopped = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, MonitorEvent::Stopped(_)))
        .count();
    assert_eq!(stopped, 1);
}

#[tokio::test(start_paused = true)]
async fn second_session_is_refused_while_first_runs() {
    let _session = exclusive();
    let monitor = LagMonitor::new(config(10, 1_000)).unwrap();
    let handle = monitor.start(|_| {}).unwrap();

    assert!(matches!(monitor.start(|_| {}), Err(MonitorError::AlreadyRunning)));

    handle.stop();
    handle.wait().await.unwrap();

    // Free again once the first session is gone.
    let again = monitor.start(|_| {}).unwrap();
    again.stop();
    again.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn second_monitor_in_the_same_process_is_refused() {
    let _session = exclusive();
    let first = LagMonitor::new(config(10, 1_000)).unwrap();
    let second = LagMonitor::new(config(10, 1_000)).unwrap();

    let handle = first.start(|_| {}).unwrap();
    assert!(LagMonitor::session_in_progress());
    assert!(matches!(second.start(|_| {}), Err(MonitorError::AlreadyRunning)));
    assert!(matches!(
        second.run(&StopHandle::new(), |_| {}).await,
        Err(MonitorError::AlreadyRunning)
    ));
    assert!(!second.is_active());

    handle.stop();
    handle.wait().await.unwrap();
    assert!(!LagMonitor::session_in_progress());

    // The slot is free for any monitor once the first session is gone.
    let again = second.start(|_| {}).unwrap();
    assert!(second.is_active());
    again.stop();
    again.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn panicking_sink_aborts_only_that_session() {
    let _session = exclusive();
    let monitor = LagMonitor::new(config(10, 1_000)).unwrap();
    let handle = monitor
        .start(|event| {
            if let MonitorEvent::Tick(report) = event {
                if report.tick == 2 {
                    panic!("display layer blew up");
                }
            }
        })
        .unwrap();

    let result = handle.wait().await;
    assert!(matches!(result, Err(MonitorError::SessionAborted(_))));
    assert!(!monitor.is_active());
    assert!(!LagMonitor::session_in_progress());
}

#[tokio::test(flavor = "current_thread")]
async fn cpu_loop_on_the_same_thread_shows_up_as_lag() {
    let _session = exclusive();
    let monitor = LagMonitor::new(config(5, 10_000)).unwrap();
    let handle = monitor.start(|_| {}).unwrap();

    // Let a few ticks happen, then hog the thread.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let outcome = run_blocking_demo(BlockingMode::CpuLoop {
        iterations: 20_000_000,
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    handle.stop();
    let report = handle.wait().await.unwrap();
    let stats = report.stats.expect("ticks were recorded");

    let blocked_ms = outcome.duration.as_secs_f64() * 1000.0;
    assert!(
        stats.max_ms >= blocked_ms - 10.0,
        "max lag {:.1}ms should reflect a {:.1}ms stall",
        stats.max_ms,
        blocked_ms
    );
}

#[tokio::test(flavor = "current_thread")]
async fn chunked_loop_lets_ticks_run_in_between() {
    let _session = exclusive();
    let monitor = LagMonitor::new(config(1, 10_000)).unwrap();
    let (events, sink) = collecting_sink();
    let handle = monitor.start(sink).unwrap();

    let outcome = run_blocking_demo(BlockingMode::Chunked {
        iterations: 30_000_000,
        chunk_size: 100_000,
    })
    .await
    .unwrap();

    let ticks_during_demo = events.lock().unwrap().len();
    handle.stop();
    handle.wait().await.unwrap();

    // Only meaningful if the loop ran long enough for the timer to fire.
    if outcome.duration >= Duration::from_millis(20) {
        assert!(ticks_during_demo > 0, "no tick ran during a {:?} chunked loop", outcome.duration);
    }
}

#[tokio::test(flavor = "current_thread")]
async fn read_modes_report_file_size() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, &[7u8; 4096]).unwrap();

    let sync = run_blocking_demo(BlockingMode::SyncRead {
        path: file.path().to_path_buf(),
    })
    .await
    .unwrap();
    let asynchronous = run_blocking_demo(BlockingMode::AsyncRead {
        path: file.path().to_path_buf(),
    })
    .await
    .unwrap();

    assert_eq!(sync.result, 4096.0);
    assert_eq!(asynchronous.result, 4096.0);
    assert_eq!(sync.mode, "sync-read");
    assert_eq!(asynchronous.mode, "async-read");
}

#[tokio::test(flavor = "current_thread")]
async fn missing_file_is_an_io_error() {
    let result = run_blocking_demo(BlockingMode::SyncRead {
        path: "/definitely/not/here".into(),
    })
    .await;
    assert!(matches!(result, Err(MonitorError::Io(_))));
}
