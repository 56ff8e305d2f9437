//! Oblivious tree with linear leaves.
//!
//! Every leaf owns the conjunction of split predicates that defines its region
//! and a linear model over the raw features it uses. Because all leaves of an
//! oblivious tree share the same sequence of (feature, condition) splits, leaf
//! regions differ only in the sides taken, and together they partition the
//! feature space.

use ndarray::Array1;

use crate::data::SamplesView;
use crate::model::{Model, ModelError};
use crate::utils::Parallelism;

/// One predicate on a leaf's path: `(x[orig_feature] <= border) == is_left`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Split {
    /// Grid-local feature index.
    pub feature: usize,
    /// Raw column the predicate reads.
    pub orig_feature: usize,
    /// Border index within the feature.
    pub condition: usize,
    pub border: f32,
    pub is_left: bool,
}

impl Split {
    /// Whether `x` satisfies this predicate. NaN goes right.
    #[inline]
    pub fn matches(&self, x: &[f32]) -> bool {
        (x[self.orig_feature] <= self.border) == self.is_left
    }
}

/// A finalized leaf: region plus fitted linear model.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafModel {
    columns: Vec<usize>,
    weights: Vec<f64>,
    splits: Vec<Split>,
}

impl LeafModel {
    /// `weights[k]` multiplies raw column `columns[k]`.
    pub fn new(columns: Vec<usize>, weights: Vec<f64>, splits: Vec<Split>) -> Self {
        debug_assert_eq!(columns.len(), weights.len());
        Self {
            columns,
            weights,
            splits,
        }
    }

    #[inline]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    #[inline]
    pub fn is_in_region(&self, x: &[f32]) -> bool {
        self.splits.iter().all(|split| split.matches(x))
    }

    /// Linear model output, ignoring the region.
    #[inline]
    pub fn value(&self, x: &[f32]) -> f64 {
        self.columns
            .iter()
            .zip(&self.weights)
            .map(|(&c, &w)| x[c] as f64 * w)
            .sum()
    }

    fn required_features(&self) -> usize {
        let columns = self.columns.iter().copied();
        let splits = self.splits.iter().map(|s| s.orig_feature);
        columns.chain(splits).map(|c| c + 1).max().unwrap_or(0)
    }
}

/// A trained oblivious tree with linear leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearObliviousTree {
    leaves: Vec<LeafModel>,
    scale: f64,
    n_features: usize,
}

impl LinearObliviousTree {
    pub fn new(leaves: Vec<LeafModel>) -> Self {
        let n_features = leaves
            .iter()
            .map(LeafModel::required_features)
            .max()
            .unwrap_or(0);
        Self {
            leaves,
            scale: 1.0,
            n_features,
        }
    }

    /// Same tree with every output multiplied by `scale`.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn leaves(&self) -> &[LeafModel] {
        &self.leaves
    }

    /// Number of splits on every leaf path.
    #[inline]
    pub fn depth(&self) -> usize {
        self.leaves.first().map_or(0, |leaf| leaf.splits.len())
    }

    /// Leaf whose region contains `x`.
    pub fn find_leaf(&self, x: &[f32]) -> Result<&LeafModel, ModelError> {
        if x.len() < self.n_features {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.n_features,
                got: x.len(),
            });
        }
        self.leaves
            .iter()
            .find(|leaf| leaf.is_in_region(x))
            .ok_or(ModelError::NoMatchingLeaf)
    }

    /// Outputs for every sample of `samples`.
    pub fn predict(
        &self,
        samples: SamplesView<'_>,
        parallelism: Parallelism,
    ) -> Result<Array1<f64>, ModelError> {
        let view = samples.view();
        let values = parallelism.maybe_par_map(0..view.nrows(), |i| {
            let row = view.row(i);
            match row.as_slice() {
                Some(x) => self.value(x),
                None => self.value(&row.to_vec()),
            }
        });
        values
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map(Array1::from)
    }
}

impl Model for LinearObliviousTree {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn value(&self, x: &[f32]) -> Result<f64, ModelError> {
        let leaf = self.find_leaf(x)?;
        Ok(self.scale * leaf.value(x))
    }
}
