use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use runlab_pool::{ElementOp, TaskPayload, UpdateKind};

/// Event-loop lag, worker pool and shared-memory experiments.
///
/// Defaults come from `RUNLAB_*` environment variables (and `.env`);
/// flags override them for a single run.
#[derive(Parser, Debug)]
#[command(name = "runlab", about = "Event-loop lag, worker pool and shared-memory experiments")]
pub struct CliArgs {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} first
    #[arg(long, env = "RUNLAB_PROFILE", global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample event-loop lag, optionally blocking the loop halfway through
    Monitor(MonitorArgs),
    /// Run one blocking demo and report how long it held the thread
    Block(BlockArgs),
    /// Run a batch of tasks on a fixed worker pool
    Pool(PoolArgs),
    /// Run a batch with one fresh thread per task
    Oneshot(OneshotArgs),
    /// Transform a shared buffer in parallel over disjoint ranges
    Parallel(ParallelArgs),
    /// Hammer a shared buffer with atomic writes at random indices
    Concurrent(ConcurrentArgs),
    /// Print the resolved configuration as JSON
    Config,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Tick interval (default: RUNLAB_SAMPLE_INTERVAL_MS)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Session length (default: RUNLAB_MONITOR_TIMEOUT_MS)
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Blocking demo to run halfway through the session
    #[arg(long, value_enum)]
    pub block: Option<BlockKind>,

    #[command(flatten)]
    pub work: BlockWork,

    /// Only print the final report
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct BlockArgs {
    #[arg(value_enum)]
    pub mode: BlockKind,

    #[command(flatten)]
    pub work: BlockWork,
}

/// Parameters shared by every blocking demo.
#[derive(Args, Debug, Clone)]
pub struct BlockWork {
    /// Loop iterations for cpu-loop and chunked
    #[arg(long, default_value_t = 100_000_000)]
    pub iterations: u64,

    /// Iterations between yields for chunked and interruptible
    #[arg(long, default_value_t = runlab_monitor::blocking::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// File to read for sync-read and async-read
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Time limit for interruptible
    #[arg(long, default_value_t = 2_000)]
    pub timeout_ms: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    CpuLoop,
    SyncRead,
    AsyncRead,
    Chunked,
    Interruptible,
}

#[derive(Args, Debug)]
pub struct PoolArgs {
    /// Pool size (default: RUNLAB_POOL_SIZE)
    #[arg(long)]
    pub workers: Option<usize>,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct OneshotArgs {
    /// Threads alive at once (default: RUNLAB_POOL_SIZE)
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Number of tasks in the batch
    #[arg(long, default_value_t = 8)]
    pub tasks: usize,

    #[arg(long, value_enum, default_value_t = Workload::Mixed)]
    pub workload: Workload,

    /// Replace the task with this id by one that fails
    #[arg(long)]
    pub fail_at: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Fibonacci,
    SumOfSquares,
    CountPrimes,
    Sleep,
    /// Cycle through every kind
    Mixed,
}

impl Workload {
    fn payload(self, i: usize) -> TaskPayload {
        match self {
            Workload::Fibonacci => TaskPayload::Fibonacci { n: 25 + (i % 5) as u32 },
            Workload::SumOfSquares => TaskPayload::SumOfSquares { n: 1_000_000 },
            Workload::CountPrimes => TaskPayload::CountPrimes { limit: 50_000 },
            Workload::Sleep => TaskPayload::Sleep {
                millis: 50,
                value: i as f64,
            },
            Workload::Mixed => {
                let kinds = [
                    Workload::Fibonacci,
                    Workload::SumOfSquares,
                    Workload::CountPrimes,
                    Workload::Sleep,
                ];
                kinds[i % kinds.len()].payload(i)
            }
        }
    }
}

impl BatchArgs {
    pub fn payloads(&self) -> Vec<TaskPayload> {
        (0..self.tasks)
            .map(|i| match self.fail_at {
                Some(at) if at == i => TaskPayload::Fail {
                    reason: format!("task {i} was asked to fail"),
                },
                _ => self.workload.payload(i),
            })
            .collect()
    }
}

#[derive(Args, Debug)]
pub struct ParallelArgs {
    /// Buffer length; element i starts at i
    #[arg(long, default_value_t = 1_000_000)]
    pub len: usize,

    /// Units (default: RUNLAB_PARALLEL_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,

    /// square, sqrt, increment or double
    #[arg(long, default_value = "square")]
    pub op: ElementOp,
}

#[derive(Args, Debug)]
pub struct ConcurrentArgs {
    /// Buffer length
    #[arg(long, default_value_t = 1_024)]
    pub len: usize,

    /// Units (default: RUNLAB_PARALLEL_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Writes per unit
    #[arg(long, default_value_t = 10_000)]
    pub updates: usize,

    #[arg(long, value_enum, default_value_t = UpdateArg::Stamp)]
    pub kind: UpdateArg,

    /// Seed for index selection (default: RUNLAB_UPDATE_SEED, else random)
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateArg {
    Stamp,
    Increment,
}

impl From<UpdateArg> for UpdateKind {
    fn from(arg: UpdateArg) -> Self {
        match arg {
            UpdateArg::Stamp => UpdateKind::Stamp,
            UpdateArg::Increment => UpdateKind::Increment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_monitor_with_block() {
        let args = CliArgs::parse_from([
            "runlab",
            "monitor",
            "--duration-ms",
            "2000",
            "--block",
            "cpu-loop",
            "--iterations",
            "1000",
        ]);
        match args.command {
            Command::Monitor(m) => {
                assert_eq!(m.duration_ms, Some(2000));
                assert_eq!(m.interval_ms, None);
                assert_eq!(m.block, Some(BlockKind::CpuLoop));
                assert_eq!(m.work.iterations, 1000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_parallel_op() {
        let args = CliArgs::parse_from(["runlab", "parallel", "--op", "sqrt", "--workers", "3"]);
        match args.command {
            Command::Parallel(p) => {
                assert_eq!(p.op, ElementOp::Sqrt);
                assert_eq!(p.workers, Some(3));
                assert_eq!(p.len, 1_000_000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(CliArgs::try_parse_from(["runlab", "parallel", "--op", "cube"]).is_err());
    }

    #[test]
    fn test_batch_payloads_with_failure() {
        let batch = BatchArgs {
            tasks: 5,
            workload: Workload::Mixed,
            fail_at: Some(2),
        };
        let payloads = batch.payloads();
        assert_eq!(payloads.len(), 5);
        assert_eq!(payloads[0].kind(), "fibonacci");
        assert_eq!(payloads[1].kind(), "sum_of_squares");
        assert_eq!(payloads[2].kind(), "fail");
        assert_eq!(payloads[3].kind(), "sleep");
        assert_eq!(payloads[4].kind(), "fibonacci");
    }
}
