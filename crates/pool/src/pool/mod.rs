//! Fixed-size worker pool -- owns the execution units and drains task batches.
//!
//! Split into focused submodules:
//! - `core`: WorkerPool struct, initialization, accessors, and cleanup
//! - `schedule`: batch validation, FIFO dispatch, and result collection

mod core;
mod schedule;
#[cfg(test)]
mod tests;

pub use self::core::WorkerPool;
