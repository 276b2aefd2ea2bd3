//! One numeric buffer shared across execution units.
//!
//! No unit owns a [`SharedBuffer`] exclusively. Cloning it clones the handle,
//! not the data. Every element is an `f64` stored as bits in an `AtomicU64`,
//! so plain indexed assignment from several threads is impossible: disjoint
//! ranges use relaxed loads and stores, overlapping writers use atomic
//! read-modify-write.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Fixed-length `f64` buffer visible to every unit holding a clone.
#[derive(Clone)]
pub struct SharedBuffer {
    cells: Arc<[AtomicU64]>,
}

impl SharedBuffer {
    /// A zero-filled buffer of `len` elements.
    pub fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| AtomicU64::new(0f64.to_bits())).collect(),
        }
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            cells: values.iter().map(|v| AtomicU64::new(v.to_bits())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.cells
            .get(index)
            .map(|c| f64::from_bits(c.load(Ordering::Acquire)))
    }

    /// Snapshot of every element.
    pub fn to_vec(&self) -> Vec<f64> {
        self.cells
            .iter()
            .map(|c| f64::from_bits(c.load(Ordering::Acquire)))
            .collect()
    }

    pub fn sum(&self) -> f64 {
        self.to_vec().iter().sum()
    }

    /// Whether both handles point at the same memory.
    pub fn is_shared_with(&self, other: &SharedBuffer) -> bool {
        Arc::ptr_eq(&self.cells, &other.cells)
    }

    pub(crate) fn cells(&self) -> &[AtomicU64] {
        &self.cells
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

/// Element-wise transform applied by `parallel_process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementOp {
    Square,
    Sqrt,
    Increment,
    Double,
}

impl ElementOp {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            ElementOp::Square => value * value,
            ElementOp::Sqrt => value.sqrt(),
            ElementOp::Increment => value + 1.0,
            ElementOp::Double => value * 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementOp::Square => "square",
            ElementOp::Sqrt => "sqrt",
            ElementOp::Increment => "increment",
            ElementOp::Double => "double",
        }
    }
}

impl fmt::Display for ElementOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "square" => Ok(ElementOp::Square),
            "sqrt" => Ok(ElementOp::Sqrt),
            "increment" | "inc" => Ok(ElementOp::Increment),
            "double" => Ok(ElementOp::Double),
            other => Err(format!(
                "unknown op '{other}' (expected square, sqrt, increment or double)"
            )),
        }
    }
}

/// Split `[0, len)` into `workers` contiguous ranges. The last range absorbs
/// the remainder. With more workers than elements, leading ranges are empty.
/// `workers == 0` yields no ranges.
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }
    let chunk = len / workers;
    (0..workers)
        .map(|i| {
            let start = i * chunk;
            let end = if i + 1 == workers { len } else { start + chunk };
            start..end
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_memory() {
        let a = SharedBuffer::from_slice(&[1.0, 2.0]);
        let b = a.clone();
        assert!(a.is_shared_with(&b));
        b.cells()[0].store(5f64.to_bits(), Ordering::Release);
        assert_eq!(a.get(0), Some(5.0));
        assert!(!a.is_shared_with(&SharedBuffer::from_slice(&[1.0, 2.0])));
    }

    #[test]
    fn new_buffer_is_zeroed() {
        let buf = SharedBuffer::new(4);
        assert_eq!(buf.to_vec(), vec![0.0; 4]);
        assert_eq!(buf.get(4), None);
    }

    #[test]
    fn ops_parse_and_apply() {
        assert_eq!("Square".parse::<ElementOp>().unwrap().apply(3.0), 9.0);
        assert_eq!("sqrt".parse::<ElementOp>().unwrap().apply(16.0), 4.0);
        assert_eq!("inc".parse::<ElementOp>().unwrap().apply(1.5), 2.5);
        assert_eq!("double".parse::<ElementOp>().unwrap().apply(-2.0), -4.0);
        assert!("cube".parse::<ElementOp>().is_err());
        assert_eq!(ElementOp::Increment.to_string(), "increment");
    }

    #[test]
    fn partition_remainder_goes_to_last_range() {
        assert_eq!(partition(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(partition(4, 2), vec![0..2, 2..4]);
        assert_eq!(partition(2, 4), vec![0..0, 0..0, 0..0, 0..2]);
        assert!(partition(5, 0).is_empty());
    }
}
