//! Configuration for linear oblivious tree training.

use bon::Builder;

use super::TrainError;
use crate::training::Verbosity;

/// Deepest tree the learner will grow.
pub const MAX_DEPTH_LIMIT: usize = 16;

/// Parameters of one tree fit.
///
/// # Example
///
/// ```
/// use linear_oblivious_tree::training::LinearTreeParams;
///
/// let params = LinearTreeParams::builder()
///     .max_depth(4)
///     .l2_reg(0.1)
///     .bias_feature(0)
///     .build();
/// assert!(params.validate().is_ok());
/// ```
#[derive(Clone, Debug, Builder)]
pub struct LinearTreeParams {
    /// Number of split levels (default: 6). The tree has `2^max_depth` leaves.
    #[builder(default = 6)]
    pub max_depth: usize,
    /// Ridge penalty on leaf weights (default: 0.01). Floored at `1e-8`.
    #[builder(default = 0.01)]
    pub l2_reg: f64,
    /// Penalty on the mean diagonal of `XᵀX` in split scores (default: 0.0).
    #[builder(default = 0.0)]
    pub trace_reg: f64,
    /// Raw column holding the constant intercept feature. Required to fit.
    pub bias_feature: Option<usize>,
    /// Derive the larger child of each pair by subtraction (default: true).
    /// When off, both children are rescanned.
    #[builder(default = true)]
    pub histogram_subtraction: bool,
    /// Worker threads: 0 = rayon default, 1 = sequential.
    #[builder(default = 0)]
    pub n_threads: usize,
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl Default for LinearTreeParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LinearTreeParams {
    /// Check value ranges. The bias column is checked against the data at fit time.
    pub fn validate(&self) -> Result<(), TrainError> {
        if !(1..=MAX_DEPTH_LIMIT).contains(&self.max_depth) {
            return Err(TrainError::InvalidParams {
                name: "max_depth",
                reason: format!(
                    "must be in 1..={MAX_DEPTH_LIMIT}, got {}",
                    self.max_depth
                ),
            });
        }
        for (name, value) in [("l2_reg", self.l2_reg), ("trace_reg", self.trace_reg)] {
            if !value.is_finite() || value < 0.0 {
                return Err(TrainError::InvalidParams {
                    name,
                    reason: format!("must be finite and non-negative, got {value}"),
                });
            }
        }
        Ok(())
    }

    /// Statistic capacity: bias, one feature per level, and the candidate slot.
    #[inline]
    pub(crate) fn stat_capacity(&self) -> usize {
        self.max_depth + 2
    }
}
