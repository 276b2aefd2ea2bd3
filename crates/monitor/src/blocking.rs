//! Long-running operations executed on the scheduling thread itself.
//!
//! `CpuLoop` and `SyncRead` never give the runtime a chance to run anything
//! else, so a [`LagMonitor`](crate::LagMonitor) sharing the thread stalls for
//! their whole duration. `Chunked` and `Interruptible` yield between chunks,
//! which is also where `Interruptible` checks its cancel flag and timeout.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::MonitorError;

/// Inner iterations between two yields of the chunked variants.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000_000;

/// Cooperative cancellation flag for [`BlockingMode::Interruptible`].
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which blocking behavior to demonstrate.
#[derive(Debug, Clone)]
pub enum BlockingMode {
    /// Tight arithmetic loop, never yields.
    CpuLoop { iterations: u64 },
    /// Read a whole file with blocking I/O on the runtime thread.
    SyncRead { path: PathBuf },
    /// Read a whole file through the runtime's async file API.
    AsyncRead { path: PathBuf },
    /// Same work as `CpuLoop`, yielding every `chunk_size` iterations.
    Chunked { iterations: u64, chunk_size: u64 },
    /// Unbounded loop, stopped by `cancel` or `timeout`, checked once per chunk.
    Interruptible {
        timeout: Duration,
        chunk_size: u64,
        cancel: CancelFlag,
    },
}

impl BlockingMode {
    pub fn name(&self) -> &'static str {
        match self {
            BlockingMode::CpuLoop { .. } => "cpu-loop",
            BlockingMode::SyncRead { .. } => "sync-read",
            BlockingMode::AsyncRead { .. } => "async-read",
            BlockingMode::Chunked { .. } => "chunked",
            BlockingMode::Interruptible { .. } => "interruptible",
        }
    }

    /// Whether the mode hands control back to the runtime while it runs.
    pub fn yields(&self) -> bool {
        !matches!(self, BlockingMode::CpuLoop { .. } | BlockingMode::SyncRead { .. })
    }

    fn validate(&self) -> Result<(), MonitorError> {
        match self {
            BlockingMode::Chunked { chunk_size, .. } if *chunk_size == 0 => Err(
                MonitorError::InvalidConfig("chunk_size must be greater than zero".into()),
            ),
            BlockingMode::Interruptible { chunk_size, .. } if *chunk_size == 0 => Err(
                MonitorError::InvalidConfig("chunk_size must be greater than zero".into()),
            ),
            BlockingMode::Interruptible { timeout, .. } if timeout.is_zero() => Err(
                MonitorError::InvalidConfig("timeout must be greater than zero".into()),
            ),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for BlockingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an interruptible loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Interruption {
    Cancelled,
    TimedOut,
}

/// Terminal result of a blocking demo.
#[derive(Debug, Clone, Serialize)]
pub struct BlockingOutcome {
    pub mode: &'static str,
    pub duration: Duration,
    /// Loop accumulator, or bytes read for the I/O modes.
    pub result: f64,
    /// Inner iterations completed (0 for the I/O modes).
    pub iterations: u64,
    pub interruption: Option<Interruption>,
}

/// Run one blocking demo on the calling task.
pub async fn run_blocking_demo(mode: BlockingMode) -> Result<BlockingOutcome, MonitorError> {
    mode.validate()?;
    let name = mode.name();
    info!(mode = name, "blocking demo started");
    let start = Instant::now();

    let (result, iterations, interruption) = match mode {
        BlockingMode::CpuLoop { iterations } => (cpu_loop(0, iterations), iterations, None),
        BlockingMode::SyncRead { path } => {
            let bytes = std::fs::read(&path)?;
            (bytes.len() as f64, 0, None)
        }
        BlockingMode::AsyncRead { path } => {
            let bytes = tokio::fs::read(&path).await?;
            (bytes.len() as f64, 0, None)
        }
        BlockingMode::Chunked {
            iterations,
            chunk_size,
        } => (chunked_loop(iterations, chunk_size).await, iterations, None),
        BlockingMode::Interruptible {
            timeout,
            chunk_size,
            cancel,
        } => {
            let (acc, done, why) = interruptible_loop(timeout, chunk_size, &cancel).await;
            (acc, done, Some(why))
        }
    };

    let outcome = BlockingOutcome {
        mode: name,
        duration: start.elapsed(),
        result,
        iterations,
        interruption,
    };
    info!(
        mode = name,
        duration_ms = outcome.duration.as_secs_f64() * 1000.0,
        iterations = outcome.iterations,
        "blocking demo finished"
    );
    Ok(outcome)
}

fn cpu_loop(from: u64, to: u64) -> f64 {
    let mut acc = 0.0;
    for i in from..to {
        acc += (i as f64).sqrt();
    }
    acc
}

async fn chunked_loop(iterations: u64, chunk_size: u64) -> f64 {
    let mut acc = 0.0;
    let mut done = 0;
    while done < iterations {
        let end = done.saturating_add(chunk_size).min(iterations);
        acc += cpu_loop(done, end);
        done = end;
        tokio::task::yield_now().await;
    }
    acc
}

async fn interruptible_loop(
    timeout: Duration,
    chunk_size: u64,
    cancel: &CancelFlag,
) -> (f64, u64, Interruption) {
    let start = Instant::now();
    let mut acc = 0.0;
    let mut done: u64 = 0;
    loop {
        let end = done.saturating_add(chunk_size);
        acc += cpu_loop(done, end);
        done = end;

        if cancel.is_cancelled() {
            debug!(iterations = done, "interruptible loop cancelled");
            return (acc, done, Interruption::Cancelled);
        }
        if start.elapsed() >= timeout {
            debug!(iterations = done, "interruptible loop hit its timeout");
            return (acc, done, Interruption::TimedOut);
        }
        tokio::task::yield_now().await;
    }
}
