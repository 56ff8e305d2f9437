//! Inference interface of trained models.
//!
//! A boosting orchestrator only needs to evaluate models and accumulate their
//! outputs; [`Model`] is that contract.

/// Errors raised while evaluating a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("no leaf region contains the sample")]
    NoMatchingLeaf,

    #[error("gradients are not supported by this model")]
    GradientUnsupported,

    #[error("sample has {got} features, model expects at least {expected}")]
    FeatureCountMismatch { expected: usize, got: usize },
}

/// A trained, read-only regression model.
pub trait Model: Send + Sync {
    /// Minimum number of raw features a sample must carry.
    fn n_features(&self) -> usize;

    /// Model output for one raw sample.
    fn value(&self, x: &[f32]) -> Result<f64, ModelError>;

    /// Add this model's output for `x` to `acc`.
    fn append_to(&self, x: &[f32], acc: &mut f64) -> Result<(), ModelError> {
        *acc += self.value(x)?;
        Ok(())
    }

    /// Gradient of the output with respect to the raw features.
    fn grad(&self, _x: &[f32]) -> Result<Vec<f64>, ModelError> {
        Err(ModelError::GradientUnsupported)
    }
}
