//! Entry point for fitting a linear oblivious tree.

use std::sync::Arc;

use super::params::LinearTreeParams;
use super::session::TrainingSession;
use crate::data::{BinarizedDataSet, DataSet, DatasetError, Grid, Target};
use crate::model::Model;
use crate::repr::LinearObliviousTree;
use crate::utils::{run_with_threads, Parallelism};

/// Errors raised while training.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParams { name: &'static str, reason: String },

    #[error("a bias feature is required but none was configured")]
    MissingBiasFeature,

    #[error("bias feature {feature} is out of range for a dataset with {n_features} features")]
    InvalidBiasFeature { feature: usize, n_features: usize },

    #[error("leaf is not fitted")]
    NotFitted,

    #[error("no split feature has been used yet")]
    NoFeaturesUsed,

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Something that fits a model to a dataset and its targets.
pub trait Learner {
    type Model: Model;

    fn fit<D, T>(&self, dataset: &D, target: &T) -> Result<Self::Model, TrainError>
    where
        D: DataSet + ?Sized,
        T: Target + ?Sized;
}

/// Greedy learner for oblivious trees with ridge-regression leaves.
///
/// # Example
///
/// ```
/// use linear_oblivious_tree::data::{Grid, SamplesView};
/// use linear_oblivious_tree::training::{LinearTreeLearner, LinearTreeParams};
/// use linear_oblivious_tree::Model;
///
/// // columns: bias, x
/// let data = [1.0, 0.0, 1.0, 0.2, 1.0, 0.8, 1.0, 1.0];
/// let targets = vec![1.0f32, 1.4, 3.6, 3.0];
/// let samples = SamplesView::from_slice(&data, 4, 2).unwrap();
/// let grid = Grid::from_borders(vec![vec![], vec![0.1, 0.5, 0.9]]).unwrap();
///
/// let params = LinearTreeParams::builder()
///     .max_depth(1)
///     .l2_reg(0.0)
///     .bias_feature(0)
///     .build();
/// let learner = LinearTreeLearner::new(params, grid).unwrap();
/// let tree = learner.fit(&samples, &targets).unwrap();
///
/// assert!((tree.value(&[1.0, 0.2]).unwrap() - 1.4).abs() < 1e-3);
/// ```
#[derive(Debug, Clone)]
pub struct LinearTreeLearner {
    params: LinearTreeParams,
    grid: Arc<Grid>,
}

impl LinearTreeLearner {
    pub fn new(params: LinearTreeParams, grid: impl Into<Arc<Grid>>) -> Result<Self, TrainError> {
        params.validate()?;
        Ok(Self {
            params,
            grid: grid.into(),
        })
    }

    #[inline]
    pub fn params(&self) -> &LinearTreeParams {
        &self.params
    }

    #[inline]
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Binarize `dataset` and grow one tree.
    pub fn fit<D, T>(&self, dataset: &D, target: &T) -> Result<LinearObliviousTree, TrainError>
    where
        D: DataSet + ?Sized,
        T: Target + ?Sized,
    {
        let bias = self.check_inputs(dataset, target.targets())?;
        run_with_threads(self.params.n_threads, |parallelism| {
            let bins = BinarizedDataSet::new(dataset, &self.grid, parallelism)?;
            self.grow(dataset, &bins, target.targets(), bias, parallelism)
        })?
    }

    /// Grow one tree from bins computed earlier against the same grid.
    pub fn fit_binned<D, T>(
        &self,
        dataset: &D,
        bins: &BinarizedDataSet,
        target: &T,
    ) -> Result<LinearObliviousTree, TrainError>
    where
        D: DataSet + ?Sized,
        T: Target + ?Sized,
    {
        let bias = self.check_inputs(dataset, target.targets())?;
        if bins.n_samples() != dataset.n_samples() {
            return Err(DatasetError::BinnedLenMismatch {
                raw: dataset.n_samples(),
                binned: bins.n_samples(),
            }
            .into());
        }
        bins.check_grid(&self.grid)?;
        run_with_threads(self.params.n_threads, |parallelism| {
            self.grow(dataset, bins, target.targets(), bias, parallelism)
        })?
    }

    /// Returns the bias column.
    fn check_inputs<D: DataSet + ?Sized>(
        &self,
        dataset: &D,
        targets: &[f32],
    ) -> Result<usize, TrainError> {
        let bias = self.params.bias_feature.ok_or(TrainError::MissingBiasFeature)?;
        let n_features = dataset.n_features();
        if bias >= n_features {
            return Err(TrainError::InvalidBiasFeature {
                feature: bias,
                n_features,
            });
        }
        if dataset.n_samples() == 0 {
            return Err(DatasetError::Empty.into());
        }
        if targets.len() != dataset.n_samples() {
            return Err(DatasetError::TargetLenMismatch {
                samples: dataset.n_samples(),
                targets: targets.len(),
            }
            .into());
        }
        let required = self.grid.min_dataset_features();
        if required > n_features {
            return Err(DatasetError::MissingFeature {
                feature: required - 1,
                n_features,
            }
            .into());
        }
        Ok(bias)
    }

    fn grow<D: DataSet + ?Sized>(
        &self,
        dataset: &D,
        bins: &BinarizedDataSet,
        targets: &[f32],
        bias: usize,
        parallelism: Parallelism,
    ) -> Result<LinearObliviousTree, TrainError> {
        TrainingSession::new(
            &self.params,
            Arc::clone(&self.grid),
            dataset,
            bins,
            targets,
            bias,
            parallelism,
        )?
        .run()
    }
}

impl Learner for LinearTreeLearner {
    type Model = LinearObliviousTree;

    fn fit<D, T>(&self, dataset: &D, target: &T) -> Result<Self::Model, TrainError>
    where
        D: DataSet + ?Sized,
        T: Target + ?Sized,
    {
        LinearTreeLearner::fit(self, dataset, target)
    }
}
