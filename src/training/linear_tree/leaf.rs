//! Frontier leaves of a growing tree.

use std::collections::BTreeSet;

use super::histogram::Histogram;
use super::TrainError;
use crate::repr::{LeafModel, Split};

/// Ordered features of a leaf's linear model.
///
/// The first entry is always the bias column. Grid features follow in the order
/// they were split on; `grid` also lists grid features that read the bias column
/// itself, so they are never added twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedFeatures {
    columns: Vec<usize>,
    order: Vec<usize>,
    grid: BTreeSet<usize>,
}

impl UsedFeatures {
    /// Only the bias column, which grid feature `bias_grid` may alias.
    pub fn with_bias(bias_column: usize, bias_grid: Option<usize>) -> Self {
        Self {
            columns: vec![bias_column],
            order: Vec::new(),
            grid: bias_grid.into_iter().collect(),
        }
    }

    /// Number of model features, bias included.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Raw columns in model order.
    #[inline]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Grid features in model order, bias excluded.
    #[inline]
    pub fn grid_features(&self) -> &[usize] {
        &self.order
    }

    #[inline]
    pub fn contains(&self, feature: usize) -> bool {
        self.grid.contains(&feature)
    }

    /// Append grid feature `feature` reading `column`. Returns whether it was new.
    pub fn insert(&mut self, feature: usize, column: usize) -> bool {
        if !self.grid.insert(feature) {
            return false;
        }
        self.columns.push(column);
        self.order.push(feature);
        true
    }
}

/// A region of the current partition and its statistics.
#[derive(Debug, Clone)]
pub struct Leaf {
    id: u32,
    used: UsedFeatures,
    splits: Vec<Split>,
    hist: Histogram,
    weights: Option<Vec<f64>>,
    l2_reg: f64,
    trace_reg: f64,
}

impl Leaf {
    /// The single leaf covering every sample.
    pub fn root(used: UsedFeatures, hist: Histogram, l2_reg: f64, trace_reg: f64) -> Self {
        debug_assert_eq!(used.len(), hist.filled());
        Self {
            id: 0,
            used,
            splits: Vec::new(),
            hist,
            weights: None,
            l2_reg,
            trace_reg,
        }
    }

    /// Path identifier: children of `id` are `2·id` and `2·id + 1`.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn used_features(&self) -> &UsedFeatures {
        &self.used
    }

    #[inline]
    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    #[inline]
    pub fn histogram(&self) -> &Histogram {
        &self.hist
    }

    #[inline]
    pub fn histogram_mut(&mut self) -> &mut Histogram {
        &mut self.hist
    }

    /// Fitted weights, `None` before [`fit`](Self::fit).
    #[inline]
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Sum of both sides' ridge loss for `value <= border(feature, condition)`.
    #[inline]
    pub fn split_score(&self, feature: usize, condition: usize) -> f64 {
        let (left, right) = self
            .hist
            .split_score(feature, condition, self.l2_reg, self.trace_reg);
        left + right
    }

    /// Fit the leaf model. Later calls keep the first fit.
    pub fn fit(&mut self) -> Result<(), TrainError> {
        if self.weights.is_none() {
            self.weights = Some(self.hist.weights(self.l2_reg)?);
        }
        Ok(())
    }

    /// Linear model output for raw sample `x`.
    pub fn value(&self, x: &[f32]) -> Result<f64, TrainError> {
        let weights = self.weights.as_ref().ok_or(TrainError::NotFitted)?;
        Ok(self
            .used
            .columns()
            .iter()
            .zip(weights)
            .map(|(&c, &w)| x[c] as f64 * w)
            .sum())
    }

    #[inline]
    pub fn is_in_region(&self, x: &[f32]) -> bool {
        self.splits.iter().all(|split| split.matches(x))
    }

    /// Children for `split`; `split.is_left` is ignored.
    ///
    /// The caller supplies empty histograms already sized for the children's
    /// used features.
    pub fn split(&self, split: Split, left_hist: Histogram, right_hist: Histogram) -> (Leaf, Leaf) {
        let mut used = self.used.clone();
        used.insert(split.feature, split.orig_feature);
        debug_assert_eq!(used.len(), left_hist.filled());
        debug_assert_eq!(used.len(), right_hist.filled());

        let child = |id: u32, is_left: bool, hist: Histogram| {
            let mut splits = self.splits.clone();
            splits.push(Split { is_left, ..split });
            Leaf {
                id,
                used: used.clone(),
                splits,
                hist,
                weights: None,
                l2_reg: self.l2_reg,
                trace_reg: self.trace_reg,
            }
        };

        (
            child(2 * self.id, true, left_hist),
            child(2 * self.id + 1, false, right_hist),
        )
    }

    /// Give up the histogram once the leaf is no longer on the frontier.
    pub fn into_histogram(self) -> Histogram {
        self.hist
    }

    /// Freeze a fitted leaf.
    pub fn into_model(self) -> Result<LeafModel, TrainError> {
        let weights = self.weights.ok_or(TrainError::NotFitted)?;
        Ok(LeafModel::new(self.used.columns, weights, self.splits))
    }
}
