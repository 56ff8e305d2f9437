//! Per-leaf histograms of [`BinStat`]s.
//!
//! A [`Histogram`] holds one statistic per (grid feature, bin) in the grid's flat
//! bin space. Accumulation writes raw per-bin sums; [`Histogram::prefix_sum_bins`]
//! turns each feature's bins into cumulative sums, after which the last bin of
//! any feature holds the statistics of every sample in the leaf.
//!
//! # Subtraction trick
//!
//! A parent histogram minus one child's histogram equals the sibling's, as long
//! as all three agree on the used features. The learner rescans the smaller
//! child and derives the larger one this way.

use std::ops::{AddAssign, Sub, SubAssign};
use std::sync::Arc;

use super::ridge::{effective_lambda, RidgeProblem, DEGENERATE_SPLIT_SCORE};
use super::stat::{BinStat, CorrelationSlot};
use super::TrainError;
use crate::data::Grid;
use crate::utils::Parallelism;

/// Statistics of one leaf across every (feature, bin).
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: Vec<BinStat>,
    grid: Arc<Grid>,
    filled: usize,
    last_used_feature: Option<usize>,
    generation: u32,
}

impl Histogram {
    /// Zeroed histogram over `grid`.
    ///
    /// `capacity` bounds the number of used features plus the candidate slot.
    pub fn new(
        grid: Arc<Grid>,
        capacity: usize,
        filled: usize,
        last_used_feature: Option<usize>,
    ) -> Self {
        let bins = vec![BinStat::new(capacity, filled); grid.total_bins()];
        Self {
            bins,
            grid,
            filled,
            last_used_feature,
            generation: 0,
        }
    }

    /// Zero all statistics and set a new used-feature layout.
    pub fn reset(&mut self, filled: usize, last_used_feature: Option<usize>, generation: u32) {
        for stat in &mut self.bins {
            stat.reset(filled);
        }
        self.filled = filled;
        self.last_used_feature = last_used_feature;
        self.generation = generation;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Number of used features.
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Grid feature added by the most recent split, `None` at the root.
    #[inline]
    pub fn last_used_feature(&self) -> Option<usize> {
        self.last_used_feature
    }

    /// Pool generation this histogram was acquired in.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bins.first().map_or(0, BinStat::capacity)
    }

    #[inline]
    pub fn bin(&self, bin: usize) -> &BinStat {
        &self.bins[bin]
    }

    /// Statistic at local bin `bin` of grid feature `feature`.
    #[inline]
    pub fn feature_bin(&self, feature: usize, bin: usize) -> &BinStat {
        &self.bins[self.grid.bin_offsets()[feature] + bin]
    }

    // =========================================================================
    // Accumulation
    // =========================================================================

    /// Merge a raw statistic into flat bin `bin`.
    #[inline]
    pub fn add_bin_stat(&mut self, bin: usize, stat: &BinStat) {
        self.bins[bin] += stat;
    }

    /// Feed a new-feature row into flat bin `bin`.
    #[inline]
    pub fn add_new_correlation(
        &mut self,
        bin: usize,
        xtx_row: &[f64],
        xty: f64,
        slot: CorrelationSlot,
    ) {
        self.bins[bin].add_new_correlation(xtx_row, xty, slot);
    }

    /// Turn raw per-bin sums into per-feature cumulative sums.
    pub fn prefix_sum_bins(&mut self, parallelism: Parallelism) {
        let grid = Arc::clone(&self.grid);
        let mut segments = Vec::with_capacity(grid.n_features());
        let mut rest = self.bins.as_mut_slice();
        for f in 0..grid.n_features() {
            let (head, tail) = rest.split_at_mut(grid.conditions_count(f) + 1);
            segments.push(head);
            rest = tail;
        }

        parallelism.maybe_par_for_each_mut(&mut segments, |_, segment| {
            prefix_sum(segment);
        });
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    /// Ridge loss of both sides of `value <= border(feature, condition)`,
    /// with the candidate slot included.
    ///
    /// Must be called after [`prefix_sum_bins`](Self::prefix_sum_bins).
    pub fn split_score(
        &self,
        feature: usize,
        condition: usize,
        l2_reg: f64,
        trace_reg: f64,
    ) -> (f64, f64) {
        let offset = self.grid.bin_offsets()[feature];
        let bin = offset + condition;
        let last = self.grid.last_bin(feature);

        if condition != 0 && self.bins[bin].count() == self.bins[bin - 1].count() {
            return (DEGENERATE_SPLIT_SCORE, DEGENERATE_SPLIT_SCORE);
        }

        let dim = self.filled + 1;
        let lambda = effective_lambda(l2_reg);
        let left = RidgeProblem::from_stat(&self.bins[bin], dim);
        let right = RidgeProblem::from_difference(&self.bins[last], &self.bins[bin], dim);
        (
            left.score(lambda, trace_reg),
            right.score(lambda, trace_reg),
        )
    }

    /// Ridge weights over every sample of the leaf and every used feature.
    pub fn weights(&self, l2_reg: f64) -> Result<Vec<f64>, TrainError> {
        let feature = self.last_used_feature.ok_or(TrainError::NoFeaturesUsed)?;
        let total = &self.bins[self.grid.last_bin(feature)];
        let w = RidgeProblem::from_stat(total, self.filled).solve(effective_lambda(l2_reg));
        Ok(w.iter().copied().collect())
    }

    /// Number of samples in the leaf.
    pub fn sample_count(&self) -> Result<u32, TrainError> {
        let feature = self.last_used_feature.ok_or(TrainError::NoFeaturesUsed)?;
        Ok(self.bins[self.grid.last_bin(feature)].count())
    }
}

#[inline]
fn prefix_sum(bins: &mut [BinStat]) {
    for k in 1..bins.len() {
        let (done, rest) = bins.split_at_mut(k);
        rest[0] += &done[k - 1];
    }
}

// =============================================================================
// Histogram arithmetic
// =============================================================================

impl AddAssign<&Histogram> for Histogram {
    fn add_assign(&mut self, rhs: &Histogram) {
        debug_assert_eq!(self.bins.len(), rhs.bins.len());
        for (lhs, rhs) in self.bins.iter_mut().zip(&rhs.bins) {
            *lhs += rhs;
        }
    }
}

impl SubAssign<&Histogram> for Histogram {
    fn sub_assign(&mut self, rhs: &Histogram) {
        debug_assert_eq!(self.bins.len(), rhs.bins.len());
        for (lhs, rhs) in self.bins.iter_mut().zip(&rhs.bins) {
            *lhs -= rhs;
        }
    }
}

impl Sub for &Histogram {
    type Output = Histogram;

    fn sub(self, rhs: &Histogram) -> Histogram {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn one_feature_grid(n_borders: usize) -> Arc<Grid> {
        let borders = (0..n_borders).map(|i| i as f32 + 0.5).collect();
        Arc::new(Grid::from_borders(vec![borders]).unwrap())
    }

    #[test]
    fn test_prefix_sum_bins() {
        let grid = Arc::new(Grid::from_borders(vec![vec![0.5, 1.5], vec![0.5]]).unwrap());
        let mut hist = Histogram::new(Arc::clone(&grid), 3, 1, Some(0));

        // feature 0 bins get targets 1, 2, 3; feature 1 bins get 4, 5
        for (bin, y) in [(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0), (4, 5.0)] {
            let mut stat = BinStat::new(3, 1);
            stat.add_full_correlation(&[1.0], y);
            hist.add_bin_stat(bin, &stat);
        }

        for parallelism in [Parallelism::Sequential, Parallelism::Parallel] {
            let mut h = hist.clone();
            h.prefix_sum_bins(parallelism);

            let cumulative: Vec<f64> = (0..5).map(|b| h.bin(b).xty(0)).collect();
            assert_eq!(cumulative, vec![1.0, 3.0, 6.0, 4.0, 9.0]);
            assert_eq!(h.feature_bin(0, 2).count(), 3);
            assert_eq!(h.feature_bin(1, 1).count(), 2);
        }
    }

    #[test]
    fn test_ridge_closed_form_two_samples() {
        // bias-only leaf; sample A in bin 0 with y = 1, sample B in bin 1 with y = 3
        let grid = one_feature_grid(1);
        let mut hist = Histogram::new(Arc::clone(&grid), 3, 1, Some(0));
        for (bin, y) in [(0, 1.0), (1, 3.0)] {
            let mut stat = BinStat::new(3, 1);
            stat.add_full_correlation(&[1.0], y);
            hist.add_bin_stat(bin, &stat);
        }
        hist.prefix_sum_bins(Parallelism::Sequential);

        let w = hist.weights(0.5).unwrap();
        assert_eq!(w.len(), 1);
        assert_abs_diff_eq!(w[0], 1.6, epsilon = 1e-12);
        assert_eq!(hist.sample_count().unwrap(), 2);

        // Candidate row empty: each side solves diag(1 + λ, λ) w = (y, 0).
        for trace_reg in [0.0, 0.3] {
            let (left, right) = hist.split_score(0, 0, 0.5, trace_reg);
            assert_abs_diff_eq!(left, -1.0 / 1.5 + trace_reg * 0.5, epsilon = 1e-12);
            assert_abs_diff_eq!(right, -9.0 / 1.5 + trace_reg * 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_empty_bin_is_degenerate() {
        let grid = one_feature_grid(2);
        let mut hist = Histogram::new(Arc::clone(&grid), 3, 1, Some(0));
        let mut stat = BinStat::new(3, 1);
        stat.add_full_correlation(&[1.0], 1.0);
        hist.add_bin_stat(0, &stat);
        hist.add_bin_stat(2, &stat);
        hist.prefix_sum_bins(Parallelism::Sequential);

        // bin 1 is empty
        assert_eq!(
            hist.split_score(0, 1, 0.1, 0.0),
            (DEGENERATE_SPLIT_SCORE, DEGENERATE_SPLIT_SCORE)
        );
        // condition 0 is never degenerate
        assert!(hist.split_score(0, 0, 0.1, 0.0).0 < 0.0);
    }

    #[test]
    fn test_root_has_no_weights() {
        let hist = Histogram::new(one_feature_grid(1), 2, 1, None);
        assert!(matches!(hist.weights(0.1), Err(TrainError::NoFeaturesUsed)));
        assert!(matches!(hist.sample_count(), Err(TrainError::NoFeaturesUsed)));
    }

    #[test]
    fn test_subtraction_recovers_sibling() {
        let grid = one_feature_grid(2);
        let mut left = Histogram::new(Arc::clone(&grid), 3, 2, Some(0));
        let mut right = left.clone();
        for (bin, x, y) in [(0, 0.2, 1.0), (1, 1.1, 2.0)] {
            let mut stat = BinStat::new(3, 2);
            stat.add_full_correlation(&[1.0, x], y);
            left.add_bin_stat(bin, &stat);
        }
        let mut stat = BinStat::new(3, 2);
        stat.add_full_correlation(&[1.0, 2.4], 5.0);
        right.add_bin_stat(2, &stat);

        let mut parent = left.clone();
        parent += &right;
        let derived = &parent - &left;

        for bin in 0..grid.total_bins() {
            assert_eq!(derived.bin(bin).count(), right.bin(bin).count());
            for i in 0..2 {
                assert_abs_diff_eq!(derived.bin(bin).xty(i), right.bin(bin).xty(i));
                for j in 0..2 {
                    assert_abs_diff_eq!(derived.bin(bin).xtx(i, j), right.bin(bin).xtx(i, j));
                }
            }
        }
    }
}
