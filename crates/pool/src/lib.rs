//! Worker pool scheduling and shared-memory parallel processing.
//!
//! [`WorkerPool`] owns a fixed set of OS threads and drains a FIFO batch of
//! [`Task`]s across them, returning results in submission order.
//! [`dispatch_single`] and [`dispatch_many`] do the same work with one
//! throwaway thread per task, for comparison. [`parallel_process`] and
//! [`concurrent_update`] operate on one [`SharedBuffer`] from many threads.

pub mod error;
pub mod execute;
pub mod metrics;
pub mod oneshot;
pub mod parallel;
pub mod pool;
pub mod shared;
pub mod task;
pub mod types;
pub mod worker;

pub use error::PoolError;
pub use metrics::PoolMetrics;
pub use oneshot::{dispatch_many, dispatch_single};
pub use parallel::{concurrent_update, parallel_process, UpdateKind, UpdatePlan, WriteRecord};
pub use pool::WorkerPool;
pub use shared::{partition, ElementOp, SharedBuffer};
pub use task::{Task, TaskError, TaskPayload, TaskResult};
pub use types::{PoolConfig, PoolState};
