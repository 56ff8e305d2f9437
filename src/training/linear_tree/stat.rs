//! Per-bin sufficient statistics for ridge regression.
//!
//! A [`BinStat`] accumulates `XᵀX`, `Xᵀy` and the sample count of every sample
//! falling into one (feature, bin) cell, restricted to the features the owning
//! leaf currently uses.
//!
//! # Layout
//!
//! Storage has a fixed `capacity` (max used features + 1) so statistics never
//! reallocate while a tree grows. Of that, `filled` rows form the *inner* block
//! (used features); row `filled` is the *candidate* slot that holds the
//! correlations of one not-yet-used feature while splits are scored:
//!
//! ```text
//!            used features      candidate
//!          ┌──────────────────┬───┐
//!   used   │  inner XᵀX       │ c │
//!          ├──────────────────┼───┤
//!   cand   │  c               │ d │
//!          └──────────────────┴───┘
//! ```
//!
//! Merge and difference only touch the inner block and the count.

use std::ops::{AddAssign, SubAssign};

/// Which row a new-feature correlation is written to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelationSlot {
    /// Row `filled`: a candidate feature being scored.
    Candidate,
    /// Row `filled - 1`: a feature that was just added to the used set.
    Last,
}

/// Sufficient statistics of one (feature, bin) cell.
#[derive(Clone, Debug, PartialEq)]
pub struct BinStat {
    /// Row-major `capacity x capacity`, kept symmetric.
    xtx: Vec<f64>,
    xty: Vec<f64>,
    count: u32,
    capacity: usize,
    filled: usize,
}

impl BinStat {
    /// Zeroed statistic with room for `capacity - 1` used features plus a candidate.
    pub fn new(capacity: usize, filled: usize) -> Self {
        debug_assert!(filled < capacity, "no room for the candidate slot");
        Self {
            xtx: vec![0.0; capacity * capacity],
            xty: vec![0.0; capacity],
            count: 0,
            capacity,
            filled,
        }
    }

    /// Zero everything and resize the inner block.
    pub fn reset(&mut self, filled: usize) {
        debug_assert!(filled < self.capacity);
        self.xtx.fill(0.0);
        self.xty.fill(0.0);
        self.count = 0;
        self.filled = filled;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of used features (inner block size).
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn xtx(&self, i: usize, j: usize) -> f64 {
        self.xtx[i * self.capacity + j]
    }

    #[inline]
    pub fn xty(&self, i: usize) -> f64 {
        self.xty[i]
    }

    /// Trace of the leading `dim x dim` block.
    #[inline]
    pub fn trace(&self, dim: usize) -> f64 {
        (0..dim).map(|i| self.xtx(i, i)).sum()
    }

    /// Add one sample: `XᵀX += x xᵀ`, `Xᵀy += x y`, `count += 1`.
    ///
    /// `x` holds the sample's used features in leaf order.
    #[inline]
    pub fn add_full_correlation(&mut self, x: &[f64], y: f64) {
        debug_assert_eq!(x.len(), self.filled);
        let cap = self.capacity;
        for (i, &xi) in x.iter().enumerate() {
            self.xty[i] += xi * y;
            let row = i * cap;
            for (j, &xj) in x[..i].iter().enumerate() {
                let v = xi * xj;
                self.xtx[row + j] += v;
                self.xtx[j * cap + i] += v;
            }
            self.xtx[row + i] += xi * xi;
        }
        self.count += 1;
    }

    /// Add precomputed correlations of one new feature.
    ///
    /// `xtx_row[k]` is `Σ x_k · v` for the features before the target row and
    /// the last element is `Σ v²`; `xty` is `Σ v · y`. The count is untouched:
    /// these are the same samples seen through one more feature.
    #[inline]
    pub fn add_new_correlation(&mut self, xtx_row: &[f64], xty: f64, slot: CorrelationSlot) {
        let row = match slot {
            CorrelationSlot::Candidate => self.filled,
            CorrelationSlot::Last => {
                debug_assert!(self.filled > 0);
                self.filled - 1
            }
        };
        debug_assert_eq!(xtx_row.len(), row + 1);

        let cap = self.capacity;
        for (k, &v) in xtx_row[..row].iter().enumerate() {
            self.xtx[row * cap + k] += v;
            self.xtx[k * cap + row] += v;
        }
        self.xtx[row * cap + row] += xtx_row[row];
        self.xty[row] += xty;
    }

    /// Apply `op` to the inner block shared with `rhs`.
    #[inline]
    fn zip_inner(&mut self, rhs: &BinStat, op: impl Fn(&mut f64, f64)) {
        debug_assert_eq!(self.capacity, rhs.capacity);
        let dim = self.filled.min(rhs.filled);
        let cap = self.capacity;
        for i in 0..dim {
            let row = i * cap;
            for j in 0..dim {
                op(&mut self.xtx[row + j], rhs.xtx[row + j]);
            }
            op(&mut self.xty[i], rhs.xty[i]);
        }
    }
}

impl AddAssign<&BinStat> for BinStat {
    #[inline]
    fn add_assign(&mut self, rhs: &BinStat) {
        self.zip_inner(rhs, |a, b| *a += b);
        self.count += rhs.count;
    }
}

impl SubAssign<&BinStat> for BinStat {
    #[inline]
    fn sub_assign(&mut self, rhs: &BinStat) {
        debug_assert!(self.count >= rhs.count, "subtracting a non-subset");
        self.zip_inner(rhs, |a, b| *a -= b);
        self.count -= rhs.count;
    }
}
