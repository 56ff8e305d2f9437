//! Raw feature access and regression targets.
//!
//! The learner only needs random-access reads of raw values; storage is the
//! caller's business. [`SamplesView`] is the dense sample-major implementation
//! used by tests and by most callers.

use ndarray::{ArrayView2, Axis};

/// Dataset conversion/validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatasetError {
    #[error("feature buffer of length {len} cannot be viewed as {n_samples} x {n_features}")]
    Shape {
        len: usize,
        n_samples: usize,
        n_features: usize,
    },

    #[error("number of targets ({targets}) does not match number of samples ({samples})")]
    TargetLenMismatch { samples: usize, targets: usize },

    #[error("grid references feature {feature} but the dataset only has {n_features} features")]
    MissingFeature { feature: usize, n_features: usize },

    #[error("binarized dataset has {binned} samples, raw dataset has {raw}")]
    BinnedLenMismatch { raw: usize, binned: usize },

    #[error("binarized dataset has {binned} features, grid has {grid}")]
    BinnedGridMismatch { grid: usize, binned: usize },

    #[error("binarized feature {feature} has {binned} bins, grid has {grid}")]
    BinnedBinsMismatch {
        feature: usize,
        grid: usize,
        binned: usize,
    },

    #[error("feature {feature} of sample {sample} is not finite")]
    NonFinite { sample: usize, feature: usize },

    #[error("dataset has no samples")]
    Empty,
}

// =============================================================================
// DataSet
// =============================================================================

/// Random-access reads of raw feature values.
///
/// Feature indices are *original* column indices (see
/// [`Grid::orig_feature_index`](crate::data::Grid::orig_feature_index)).
/// Implementations must be safe to read from several workers at once.
pub trait DataSet: Sync {
    /// Number of samples (rows).
    fn n_samples(&self) -> usize;

    /// Number of raw features (columns).
    fn n_features(&self) -> usize;

    /// Raw value of `feature` for `sample`.
    fn value(&self, sample: usize, feature: usize) -> f32;

    /// Gather `features` of `sample`, in order, into `out`.
    #[inline]
    fn fill_sample(&self, sample: usize, features: &[usize], out: &mut [f64]) {
        debug_assert_eq!(features.len(), out.len());
        for (slot, &feature) in out.iter_mut().zip(features) {
            *slot = self.value(sample, feature) as f64;
        }
    }

    /// Copy one whole column into `out` (cleared first).
    fn copy_column(&self, feature: usize, out: &mut Vec<f32>) {
        out.clear();
        out.extend((0..self.n_samples()).map(|sample| self.value(sample, feature)));
    }
}

/// Sample-major view: `[n_samples, n_features]`.
#[derive(Debug, Clone, Copy)]
pub struct SamplesView<'a> {
    data: ArrayView2<'a, f32>,
}

impl<'a> SamplesView<'a> {
    /// Wrap an existing sample-major array view.
    pub fn from_array(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// View a row-major buffer as `n_samples x n_features`.
    pub fn from_slice(
        data: &'a [f32],
        n_samples: usize,
        n_features: usize,
    ) -> Result<Self, DatasetError> {
        let data = ArrayView2::from_shape((n_samples, n_features), data).map_err(|_| {
            DatasetError::Shape {
                len: data.len(),
                n_samples,
                n_features,
            }
        })?;
        Ok(Self { data })
    }

    /// The underlying array view.
    pub fn view(&self) -> ArrayView2<'a, f32> {
        self.data
    }

    /// One sample as a contiguous slice, when the layout allows it.
    pub fn sample(&self, sample: usize) -> Option<&'a [f32]> {
        self.data.index_axis_move(Axis(0), sample).to_slice()
    }
}

impl DataSet for SamplesView<'_> {
    #[inline]
    fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    fn n_features(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    fn value(&self, sample: usize, feature: usize) -> f32 {
        self.data[[sample, feature]]
    }

    fn copy_column(&self, feature: usize, out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.data.column(feature).iter().copied());
    }
}

// =============================================================================
// Target
// =============================================================================

/// Per-sample regression targets.
pub trait Target: Sync {
    fn targets(&self) -> &[f32];
}

impl Target for [f32] {
    #[inline]
    fn targets(&self) -> &[f32] {
        self
    }
}

impl Target for Vec<f32> {
    #[inline]
    fn targets(&self) -> &[f32] {
        self
    }
}
