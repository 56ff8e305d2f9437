//! Per-sample bin assignments for one grid.

use ndarray::{Array2, ArrayView2};

use super::dataset::{DataSet, DatasetError};
use super::grid::Grid;
use crate::utils::{sample_blocks, Parallelism};

/// Bin index of every (sample, grid feature) pair.
///
/// Built once per dataset and grid; the learner only reads it. A boosting loop
/// that trains many trees on the same data should build it once and call
/// [`LinearTreeLearner::fit_binned`](crate::training::LinearTreeLearner::fit_binned).
#[derive(Debug, Clone)]
pub struct BinarizedDataSet {
    bins: Array2<u16>,
    /// Bin count of each grid feature at build time.
    n_bins: Vec<usize>,
}

impl BinarizedDataSet {
    /// Binarize `dataset` against `grid`.
    pub fn new<D: DataSet + ?Sized>(
        dataset: &D,
        grid: &Grid,
        parallelism: Parallelism,
    ) -> Result<Self, DatasetError> {
        let n_samples = dataset.n_samples();
        let n_features = grid.n_features();

        let required = grid.min_dataset_features();
        if required > dataset.n_features() {
            return Err(DatasetError::MissingFeature {
                feature: required - 1,
                n_features: dataset.n_features(),
            });
        }

        let blocks = sample_blocks(n_samples, parallelism.n_blocks());
        let chunks = parallelism.maybe_par_map(blocks, |range| {
            let mut chunk = Vec::with_capacity(range.len() * n_features);
            for sample in range {
                for f in 0..n_features {
                    let value = dataset.value(sample, grid.orig_feature_index(f));
                    chunk.push(grid.bin(f, value));
                }
            }
            chunk
        });

        let flat: Vec<u16> = chunks.into_iter().flatten().collect();
        let bins = Array2::from_shape_vec((n_samples, n_features), flat).map_err(|_| {
            DatasetError::Shape {
                len: n_samples * n_features,
                n_samples,
                n_features,
            }
        })?;

        let n_bins = (0..n_features).map(|f| grid.feature_bins(f).len()).collect();
        Ok(Self { bins, n_bins })
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.bins.nrows()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.bins.ncols()
    }

    /// Number of bins of grid feature `f` when these bins were built.
    #[inline]
    pub fn n_bins(&self, f: usize) -> usize {
        self.n_bins[f]
    }

    /// Fails unless every bin index fits the layout of `grid`.
    pub fn check_grid(&self, grid: &Grid) -> Result<(), DatasetError> {
        if self.n_features() != grid.n_features() {
            return Err(DatasetError::BinnedGridMismatch {
                grid: grid.n_features(),
                binned: self.n_features(),
            });
        }
        for (f, &binned) in self.n_bins.iter().enumerate() {
            let expected = grid.feature_bins(f).len();
            if binned != expected {
                return Err(DatasetError::BinnedBinsMismatch {
                    feature: f,
                    grid: expected,
                    binned,
                });
            }
        }
        Ok(())
    }

    /// Local bin of every grid feature for `sample`.
    #[inline]
    pub fn sample_bins(&self, sample: usize) -> &[u16] {
        let n_features = self.n_features();
        // Built from a flat row-major Vec, so the storage is contiguous.
        let flat = self.bins.as_slice().unwrap_or(&[]);
        &flat[sample * n_features..(sample + 1) * n_features]
    }

    pub fn view(&self) -> ArrayView2<'_, u16> {
        self.bins.view()
    }
}
