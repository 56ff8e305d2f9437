//! Per-worker accumulation buffers.
//!
//! Every worker owns one buffer for the block of samples it scans, so cells are
//! never shared during accumulation. Buffers are reduced with `merge` before any
//! leaf histogram reads them.
//!
//! Both buffers are indexed by `(slot, flat bin)`. A slot is a leaf, or a sibling
//! pair when only one child of each pair is scanned.
//!
//! [`Partials`] keeps one buffer of each kind per sample block for the whole run;
//! every pass resets them to the shape it needs instead of allocating.

use super::stat::BinStat;
use crate::data::Grid;

/// Full-correlation statistics per `(slot, bin)`.
#[derive(Debug, Clone)]
pub(crate) struct StatBuffer {
    stats: Vec<BinStat>,
    total_bins: usize,
    capacity: usize,
}

impl StatBuffer {
    pub fn new(n_slots: usize, total_bins: usize, capacity: usize, filled: usize) -> Self {
        Self {
            stats: vec![BinStat::new(capacity, filled); n_slots * total_bins],
            total_bins,
            capacity,
        }
    }

    /// Zero every cell and reshape to `n_slots`, keeping existing allocations.
    pub fn reset(&mut self, n_slots: usize, filled: usize) {
        let len = n_slots * self.total_bins;
        self.stats.truncate(len);
        for stat in &mut self.stats {
            stat.reset(filled);
        }
        self.stats.resize(len, BinStat::new(self.capacity, filled));
    }

    #[cfg(test)]
    pub fn n_slots(&self) -> usize {
        self.stats.len() / self.total_bins.max(1)
    }

    #[inline]
    pub fn add(&mut self, slot: usize, bin: usize, x: &[f64], y: f64) {
        self.stats[slot * self.total_bins + bin].add_full_correlation(x, y);
    }

    pub fn merge(&mut self, other: &StatBuffer) {
        debug_assert_eq!(self.stats.len(), other.stats.len());
        for (lhs, rhs) in self.stats.iter_mut().zip(&other.stats) {
            *lhs += rhs;
        }
    }

    /// Raw per-bin statistics of `slot`.
    #[inline]
    pub fn slot(&self, slot: usize) -> &[BinStat] {
        &self.stats[slot * self.total_bins..(slot + 1) * self.total_bins]
    }
}

/// Correlations of one extra feature with the used features, per `(slot, bin)`.
///
/// Each cell holds a row of `width` values: `Σ x_k · v` for the `width - 1` used
/// features followed by `Σ v²`, plus `Σ v · y`.
#[derive(Debug, Clone)]
pub(crate) struct CrossBuffer {
    width: usize,
    total_bins: usize,
    xtx: Vec<f64>,
    xty: Vec<f64>,
}

impl CrossBuffer {
    pub fn new(n_slots: usize, total_bins: usize, width: usize) -> Self {
        Self {
            width,
            total_bins,
            xtx: vec![0.0; n_slots * total_bins * width],
            xty: vec![0.0; n_slots * total_bins],
        }
    }

    /// Zero every cell and reshape to `n_slots` rows of `width`.
    pub fn reset(&mut self, n_slots: usize, width: usize) {
        self.width = width;
        self.xtx.clear();
        self.xtx.resize(n_slots * self.total_bins * width, 0.0);
        self.xty.clear();
        self.xty.resize(n_slots * self.total_bins, 0.0);
    }

    /// Accumulate one sample with used features `x` and extra feature value `v`.
    #[inline]
    pub fn add(&mut self, slot: usize, bin: usize, x: &[f64], v: f64, y: f64) {
        debug_assert_eq!(x.len() + 1, self.width);
        let cell = slot * self.total_bins + bin;
        let row = &mut self.xtx[cell * self.width..(cell + 1) * self.width];
        for (acc, &xk) in row.iter_mut().zip(x) {
            *acc += xk * v;
        }
        row[x.len()] += v * v;
        self.xty[cell] += v * y;
    }

    pub fn merge(&mut self, other: &CrossBuffer) {
        debug_assert_eq!(self.xtx.len(), other.xtx.len());
        for (lhs, rhs) in self.xtx.iter_mut().zip(&other.xtx) {
            *lhs += rhs;
        }
        for (lhs, rhs) in self.xty.iter_mut().zip(&other.xty) {
            *lhs += rhs;
        }
    }

    /// Cumulative sums over the bins of each of `features`, for every slot.
    pub fn prefix_sum(&mut self, grid: &Grid, features: &[usize]) {
        let n_slots = self.xty.len() / self.total_bins.max(1);
        let width = self.width;
        for slot in 0..n_slots {
            let base = slot * self.total_bins;
            for &f in features {
                let bins = grid.feature_bins(f);
                for bin in bins.start + 1..bins.end {
                    let (prev, cur) = (base + bin - 1, base + bin);
                    self.xty[cur] += self.xty[prev];
                    let (head, tail) = self.xtx.split_at_mut(cur * width);
                    let prev_row = &head[prev * width..];
                    for (acc, &p) in tail[..width].iter_mut().zip(prev_row) {
                        *acc += p;
                    }
                }
            }
        }
    }

    #[inline]
    pub fn row(&self, slot: usize, bin: usize) -> &[f64] {
        let cell = slot * self.total_bins + bin;
        &self.xtx[cell * self.width..(cell + 1) * self.width]
    }

    #[inline]
    pub fn xty(&self, slot: usize, bin: usize) -> f64 {
        self.xty[slot * self.total_bins + bin]
    }
}

/// Per-block partial buffers recycled across passes and levels.
///
/// After a pass reduces into the first buffer of a kind, that buffer holds the
/// totals until the next `reset_*` of the same kind.
#[derive(Debug, Default)]
pub(crate) struct Partials {
    total_bins: usize,
    capacity: usize,
    stats: Vec<StatBuffer>,
    cross: Vec<CrossBuffer>,
}

impl Partials {
    pub fn new(total_bins: usize, capacity: usize) -> Self {
        Self {
            total_bins,
            capacity,
            stats: Vec::new(),
            cross: Vec::new(),
        }
    }

    pub fn reset_stats(&mut self, n_blocks: usize, n_slots: usize, filled: usize) {
        let (total_bins, capacity) = (self.total_bins, self.capacity);
        let n_blocks = n_blocks.max(1);
        self.stats.truncate(n_blocks);
        for buf in &mut self.stats {
            buf.reset(n_slots, filled);
        }
        self.stats.resize_with(n_blocks, || {
            StatBuffer::new(n_slots, total_bins, capacity, filled)
        });
    }

    pub fn reset_cross(&mut self, n_blocks: usize, n_slots: usize, width: usize) {
        let total_bins = self.total_bins;
        let n_blocks = n_blocks.max(1);
        self.cross.truncate(n_blocks);
        for buf in &mut self.cross {
            buf.reset(n_slots, width);
        }
        self.cross
            .resize_with(n_blocks, || CrossBuffer::new(n_slots, total_bins, width));
    }

    #[inline]
    pub fn stats_mut(&mut self) -> &mut [StatBuffer] {
        &mut self.stats
    }

    #[inline]
    pub fn cross_mut(&mut self) -> &mut [CrossBuffer] {
        &mut self.cross
    }

    /// Both kinds at once, block by block.
    pub fn both_mut(&mut self) -> (&mut [StatBuffer], &mut [CrossBuffer]) {
        (self.stats.as_mut_slice(), self.cross.as_mut_slice())
    }

    /// Reduced statistics of the last stats pass.
    #[inline]
    pub fn stats_total(&self) -> &StatBuffer {
        &self.stats[0]
    }

    /// Reduced correlations of the last cross pass.
    #[inline]
    pub fn cross_total(&self) -> &CrossBuffer {
        &self.cross[0]
    }

    #[inline]
    pub fn cross_total_mut(&mut self) -> &mut CrossBuffer {
        &mut self.cross[0]
    }
}
