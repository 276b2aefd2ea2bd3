mod cli;
mod terminal;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use runlab_core::config::{load_dotenv, LabConfig};
use runlab_monitor::{
    run_blocking_demo, BlockingMode, CancelFlag, LagMonitor, LagMonitorConfig, StopHandle,
};
use runlab_pool::{
    concurrent_update, dispatch_many, parallel_process, PoolConfig, SharedBuffer, Task,
    UpdateKind, UpdatePlan, WorkerPool,
};

use crate::cli::{
    BlockArgs, BlockKind, BlockWork, CliArgs, Command, ConcurrentArgs, MonitorArgs, OneshotArgs,
    ParallelArgs, PoolArgs,
};
use crate::terminal::{format_ms, preview, Terminal};

// Single-threaded on purpose: the lag monitor and the blocking demos must
// share one runtime thread for the lag to show up.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();
    let config = match args.profile.as_deref() {
        Some(profile) => LabConfig::from_env_profile(profile),
        None => LabConfig::from_env(),
    }
    .context("failed to load configuration")?;
    config.log_summary();
    if config.runtime.expose_gc {
        info!("RUNLAB_EXPOSE_GC is set; Rust frees memory on drop, nothing to trigger");
    }

    let terminal = Terminal::new();
    let outcome = match args.command {
        Command::Monitor(m) => run_monitor(&config, m, terminal).await,
        Command::Block(b) => run_block(b, terminal).await,
        Command::Pool(p) => run_pool(&config, p, terminal).await,
        Command::Oneshot(o) => run_oneshot(&config, o, terminal).await,
        Command::Parallel(p) => run_parallel(&config, p, terminal).await,
        Command::Concurrent(c) => run_concurrent(&config, c, terminal).await,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config.summary())?);
            Ok(())
        }
    };

    if let Err(e) = outcome {
        terminal.print_error(&format!("{:#}", e))?;
        std::process::exit(1);
    }
    Ok(())
}

fn blocking_mode(kind: BlockKind, work: &BlockWork, cancel: &CancelFlag) -> Result<BlockingMode> {
    let file = || {
        work.file
            .clone()
            .context("--file is required for the read demos")
    };
    Ok(match kind {
        BlockKind::CpuLoop => BlockingMode::CpuLoop {
            iterations: work.iterations,
        },
        BlockKind::SyncRead => BlockingMode::SyncRead { path: file()? },
        BlockKind::AsyncRead => BlockingMode::AsyncRead { path: file()? },
        BlockKind::Chunked => BlockingMode::Chunked {
            iterations: work.iterations,
            chunk_size: work.chunk_size,
        },
        BlockKind::Interruptible => BlockingMode::Interruptible {
            timeout: Duration::from_millis(work.timeout_ms),
            chunk_size: work.chunk_size,
            cancel: cancel.clone(),
        },
    })
}

/// Run `f` once Ctrl+C arrives. The returned task must be aborted when the
/// command finishes.
fn on_ctrl_c<F>(f: F) -> tokio::task::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            f();
        }
    })
}

async fn run_monitor(config: &LabConfig, args: MonitorArgs, terminal: Terminal) -> Result<()> {
    let mut monitor_config = LagMonitorConfig::from(&config.monitor);
    if let Some(ms) = args.interval_ms {
        monitor_config.interval_ms = ms;
    }
    if let Some(ms) = args.duration_ms {
        monitor_config.max_duration_ms = ms;
    }
    let cancel = CancelFlag::new();
    let demo = args
        .block
        .map(|kind| blocking_mode(kind, &args.work, &cancel))
        .transpose()?;

    terminal.print_banner(
        "Lag monitor",
        &format!(
            "interval {}ms, duration {}ms{}",
            monitor_config.interval_ms,
            monitor_config.max_duration_ms,
            demo.as_ref()
                .map(|m| format!(", blocking with {m} at the halfway mark"))
                .unwrap_or_default()
        ),
    )?;

    let monitor = LagMonitor::new(monitor_config.clone())?;
    let quiet = args.quiet;
    let handle = monitor.start(move |event| {
        if quiet {
            return;
        }
        if let Err(e) = terminal.display_event(&event) {
            warn!(error = %e, "failed to print monitor event");
        }
    })?;

    let stop: StopHandle = handle.stop_handle();
    let interrupt_cancel = cancel.clone();
    let ctrl_c = on_ctrl_c(move || {
        interrupt_cancel.cancel();
        stop.stop();
    });

    if let Some(mode) = demo {
        tokio::time::sleep(monitor_config.max_duration() / 2).await;
        let outcome = run_blocking_demo(mode).await?;
        terminal.print_blocking(&outcome)?;
    }

    let report = handle.wait().await;
    ctrl_c.abort();
    let report = report?;
    terminal.print_report(&report)?;
    Ok(())
}

async fn run_block(args: BlockArgs, terminal: Terminal) -> Result<()> {
    let cancel = CancelFlag::new();
    let mode = blocking_mode(args.mode, &args.work, &cancel)?;
    terminal.print_banner(
        "Blocking demo",
        &format!(
            "{mode} ({})",
            if mode.yields() { "yields to the runtime" } else { "holds the thread" }
        ),
    )?;

    let interrupt = cancel.clone();
    let ctrl_c = on_ctrl_c(move || interrupt.cancel());
    let outcome = run_blocking_demo(mode).await;
    ctrl_c.abort();

    terminal.print_blocking(&outcome?)?;
    Ok(())
}

async fn run_pool(config: &LabConfig, args: PoolArgs, terminal: Terminal) -> Result<()> {
    let mut pool_config = PoolConfig::from(&config.pool);
    if let Some(size) = args.workers {
        pool_config.size = size;
    }
    let tasks = Task::batch(args.batch.payloads());
    terminal.print_banner(
        "Worker pool",
        &format!("{} workers, {} tasks", pool_config.size, tasks.len()),
    )?;

    let mut pool = WorkerPool::initialize(pool_config)?;
    let started = Instant::now();
    let results = pool.schedule(tasks).await;
    let elapsed = started.elapsed();

    let printed = match &results {
        Ok(results) => terminal.print_task_results(results, elapsed),
        Err(_) => Ok(()),
    };
    terminal.print_pool_metrics(pool.metrics())?;
    pool.cleanup();

    results.context("batch rejected")?;
    printed
}

async fn run_oneshot(config: &LabConfig, args: OneshotArgs, terminal: Terminal) -> Result<()> {
    let concurrency = args.concurrency.unwrap_or(config.pool.size);
    let tasks = Task::batch(args.batch.payloads());
    terminal.print_banner(
        "One-shot dispatch",
        &format!("{} tasks, at most {} threads at once", tasks.len(), concurrency),
    )?;

    let started = Instant::now();
    let results = dispatch_many(tasks, concurrency)
        .await
        .context("batch rejected")?;
    terminal.print_task_results(&results, started.elapsed())
}

async fn run_parallel(config: &LabConfig, args: ParallelArgs, terminal: Terminal) -> Result<()> {
    let workers = args.workers.unwrap_or(config.parallel.workers);
    let op = args.op;
    let initial: Vec<f64> = (0..args.len).map(|i| i as f64).collect();
    let buffer = SharedBuffer::from_slice(&initial);
    terminal.print_banner(
        "Parallel processing",
        &format!("{op} over {} elements on {workers} units", args.len),
    )?;

    let shared = buffer.clone();
    let started = Instant::now();
    tokio::task::spawn_blocking(move || parallel_process(&shared, workers, op))
        .await
        .context("parallel pass panicked")??;
    let elapsed = started.elapsed();

    let values = buffer.to_vec();
    terminal.print_value("took", &format_ms(elapsed))?;
    terminal.print_value("before", &preview(&initial, 8))?;
    terminal.print_value("after", &preview(&values, 8))?;
    terminal.print_value("sum", &format!("{}", buffer.sum()))?;
    Ok(())
}

async fn run_concurrent(
    config: &LabConfig,
    args: ConcurrentArgs,
    terminal: Terminal,
) -> Result<()> {
    let workers = args.workers.unwrap_or(config.parallel.workers);
    let kind = UpdateKind::from(args.kind);
    let mut plan = UpdatePlan::new(workers, args.updates, kind);
    plan.seed = args.seed.or(config.parallel.update_seed);
    terminal.print_banner(
        "Concurrent updates",
        &format!(
            "{workers} units x {} {kind:?} writes into {} elements",
            args.updates, args.len
        ),
    )?;

    let buffer = SharedBuffer::new(args.len);
    let shared = buffer.clone();
    let task_plan = plan.clone();
    let started = Instant::now();
    let writes = tokio::task::spawn_blocking(move || concurrent_update(&shared, &task_plan))
        .await
        .context("concurrent update panicked")??;
    let elapsed = started.elapsed();

    let values = buffer.to_vec();
    let lost = match kind {
        UpdateKind::Stamp => {
            let mut stamps: HashMap<usize, Vec<f64>> = HashMap::new();
            for write in &writes {
                stamps.entry(write.index).or_default().push(write.value);
            }
            stamps
                .iter()
                .filter(|(index, written)| !written.contains(&values[**index]))
                .count()
        }
        UpdateKind::Increment => {
            let expected = plan.total_updates() as f64;
            (expected - buffer.sum()).abs() as usize
        }
    };

    terminal.print_value("took", &format_ms(elapsed))?;
    terminal.print_value("writes", &writes.len().to_string())?;
    terminal.print_value("buffer", &preview(&values, 8))?;
    terminal.print_value("lost writes", &lost.to_string())?;
    if lost > 0 {
        bail!("{lost} writes were lost");
    }
    Ok(())
}
