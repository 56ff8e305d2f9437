//! Closed-form ridge regression on accumulated statistics.

use nalgebra::{DMatrix, DVector};

use super::stat::BinStat;

/// Smallest regularization applied to any solve.
pub(crate) const MIN_L2_REG: f64 = 1e-8;

/// Score reported for both sides of a split whose bin holds no samples.
pub(crate) const DEGENERATE_SPLIT_SCORE: f64 = 1e6;

/// `XᵀX` and `Xᵀy` of one ridge problem.
#[derive(Debug, Clone)]
pub(crate) struct RidgeProblem {
    xtx: DMatrix<f64>,
    xty: DVector<f64>,
}

impl RidgeProblem {
    /// Leading `dim x dim` block of `stat`.
    pub fn from_stat(stat: &BinStat, dim: usize) -> Self {
        Self {
            xtx: DMatrix::from_fn(dim, dim, |i, j| stat.xtx(i, j)),
            xty: DVector::from_fn(dim, |i, _| stat.xty(i)),
        }
    }

    /// Leading block of `total - part`.
    pub fn from_difference(total: &BinStat, part: &BinStat, dim: usize) -> Self {
        Self {
            xtx: DMatrix::from_fn(dim, dim, |i, j| total.xtx(i, j) - part.xtx(i, j)),
            xty: DVector::from_fn(dim, |i, _| total.xty(i) - part.xty(i)),
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.xty.len()
    }

    /// `w = (XᵀX + λI)⁻¹ Xᵀy`.
    ///
    /// Cholesky first, LU when the regularized matrix is not numerically
    /// positive definite. A singular system yields zero weights.
    pub fn solve(&self, lambda: f64) -> DVector<f64> {
        let n = self.dim();
        let mut regularized = self.xtx.clone();
        for i in 0..n {
            regularized[(i, i)] += lambda;
        }

        if let Some(chol) = regularized.clone().cholesky() {
            return chol.solve(&self.xty);
        }
        regularized
            .lu()
            .solve(&self.xty)
            .unwrap_or_else(|| DVector::zeros(n))
    }

    /// Ridge loss of `w` up to the constant `yᵀy`, plus the trace penalty.
    pub fn loss(&self, w: &DVector<f64>, lambda: f64, trace_reg: f64) -> f64 {
        let n = self.dim();
        if n == 0 {
            return 0.0;
        }
        let fit = -2.0 * self.xty.dot(w) + w.dot(&(&self.xtx * w));
        let penalty = lambda * w.norm_squared();
        let trace = self.xtx.trace() / n as f64;
        fit + penalty + trace_reg * trace
    }

    /// Solve and score in one step.
    pub fn score(&self, lambda: f64, trace_reg: f64) -> f64 {
        let w = self.solve(lambda);
        self.loss(&w, lambda, trace_reg)
    }
}

/// Regularization actually used for `l2_reg`.
#[inline]
pub(crate) fn effective_lambda(l2_reg: f64) -> f64 {
    l2_reg.max(MIN_L2_REG)
}
