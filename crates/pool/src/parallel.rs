//! Parallel passes over a [`SharedBuffer`] on a dedicated rayon pool.
//!
//! Both operations return only after every unit has finished; rayon's
//! `broadcast` is the join-all.

use std::sync::atomic::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::{BroadcastContext, ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PoolError;
use crate::shared::{partition, ElementOp, SharedBuffer};

/// How each unit writes during [`concurrent_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Atomically store a value unique to this write.
    Stamp,
    /// Atomically add 1.0 with compare-and-swap.
    Increment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub workers: usize,
    pub updates_each: usize,
    pub kind: UpdateKind,
    /// Unit `w` seeds its generator with `seed + w`. `None` draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl UpdatePlan {
    pub fn new(workers: usize, updates_each: usize, kind: UpdateKind) -> Self {
        Self {
            workers,
            updates_each,
            kind,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn total_updates(&self) -> usize {
        self.workers * self.updates_each
    }
}

/// One write performed by a unit. For `Increment`, `value` is the element
/// after the add.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub worker: usize,
    pub index: usize,
    pub value: f64,
}

fn build_pool(workers: usize, prefix: &'static str) -> Result<ThreadPool, PoolError> {
    if workers == 0 {
        return Err(PoolError::InvalidConfig(
            "worker count must be at least 1".into(),
        ));
    }
    Ok(ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |i| format!("{prefix}-{i}"))
        .build()?)
}

/// Apply `op` to every element in place, each unit taking one contiguous
/// range from [`partition`]. Ranges are disjoint, so plain relaxed loads and
/// stores suffice.
pub fn parallel_process(
    buffer: &SharedBuffer,
    worker_count: usize,
    op: ElementOp,
) -> Result<(), PoolError> {
    let pool = build_pool(worker_count, "parallel")?;
    let ranges = partition(buffer.len(), worker_count);
    info!(len = buffer.len(), workers = worker_count, op = %op, "parallel pass starting");

    pool.broadcast(|ctx: BroadcastContext<'_>| {
        let Some(range) = ranges.get(ctx.index()) else {
            return;
        };
        let cells = buffer.cells();
        for cell in &cells[range.clone()] {
            let value = f64::from_bits(cell.load(Ordering::Relaxed));
            cell.store(op.apply(value).to_bits(), Ordering::Relaxed);
        }
        debug!(unit = ctx.index(), start = range.start, end = range.end, "range processed");
    });

    info!(len = buffer.len(), "parallel pass complete");
    Ok(())
}

/// Every unit writes to random indices across the whole buffer. No ordering
/// between units is promised, only that no write is lost. Returns the write
/// log of every unit, grouped by unit.
pub fn concurrent_update(
    buffer: &SharedBuffer,
    plan: &UpdatePlan,
) -> Result<Vec<WriteRecord>, PoolError> {
    let pool = build_pool(plan.workers, "concurrent")?;
    if buffer.is_empty() && plan.updates_each > 0 {
        return Err(PoolError::InvalidConfig(
            "cannot update an empty buffer".into(),
        ));
    }
    info!(
        len = buffer.len(),
        workers = plan.workers,
        updates_each = plan.updates_each,
        kind = ?plan.kind,
        "concurrent update starting"
    );

    let logs = pool.broadcast(|ctx: BroadcastContext<'_>| {
        let worker = ctx.index();
        let mut rng = match plan.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
            None => StdRng::from_entropy(),
        };
        let cells = buffer.cells();
        let mut log = Vec::with_capacity(plan.updates_each);

        for k in 0..plan.updates_each {
            let index = rng.gen_range(0..cells.len());
            let cell = &cells[index];
            let value = match plan.kind {
                UpdateKind::Stamp => {
                    let stamp = (worker * plan.updates_each + k + 1) as f64;
                    cell.store(stamp.to_bits(), Ordering::Release);
                    stamp
                }
                UpdateKind::Increment => {
                    let bump = |bits: u64| Some((f64::from_bits(bits) + 1.0).to_bits());
                    let previous =
                        match cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, bump) {
                            Ok(bits) | Err(bits) => bits,
                        };
                    f64::from_bits(previous) + 1.0
                }
            };
            log.push(WriteRecord {
                worker,
                index,
                value,
            });
        }
        log
    });

    let writes: Vec<WriteRecord> = logs.into_iter().flatten().collect();
    info!(writes = writes.len(), "concurrent update complete");
    Ok(writes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_is_rejected() {
        let buffer = SharedBuffer::new(4);
        assert!(matches!(
            parallel_process(&buffer, 0, ElementOp::Square),
            Err(PoolError::InvalidConfig(_))
        ));
        let plan = UpdatePlan::new(0, 10, UpdateKind::Stamp);
        assert!(matches!(
            concurrent_update(&buffer, &plan),
            Err(PoolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_buffer_cannot_take_updates() {
        let plan = UpdatePlan::new(2, 1, UpdateKind::Increment);
        assert!(matches!(
            concurrent_update(&SharedBuffer::new(0), &plan),
            Err(PoolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn more_workers_than_elements_still_covers_buffer() {
        let buffer = SharedBuffer::from_slice(&[1.0, 2.0]);
        parallel_process(&buffer, 5, ElementOp::Double).unwrap();
        assert_eq!(buffer.to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn seeded_plans_pick_the_same_indices() {
        let plan = UpdatePlan::new(3, 20, UpdateKind::Stamp).with_seed(7);
        let indices = |writes: Vec<WriteRecord>| -> Vec<(usize, usize)> {
            writes.iter().map(|w| (w.worker, w.index)).collect()
        };
        let a = concurrent_update(&SharedBuffer::new(16), &plan).unwrap();
        let b = concurrent_update(&SharedBuffer::new(16), &plan).unwrap();
        assert_eq!(indices(a), indices(b));
    }

    #[test]
    fn stamps_are_unique() {
        let plan = UpdatePlan::new(4, 25, UpdateKind::Stamp).with_seed(1);
        let writes = concurrent_update(&SharedBuffer::new(8), &plan).unwrap();
        let mut stamps: Vec<u64> = writes.iter().map(|w| w.value as u64).collect();
        stamps.sort_unstable();
        stamps.dedup();
        assert_eq!(stamps.len(), plan.total_updates());
    }
}
