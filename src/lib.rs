//! linear-oblivious-tree: greedy oblivious decision trees with linear leaves.
//!
//! A tree is grown level by level; every level applies one (feature, border)
//! split to all leaves, and every leaf ends up with a ridge-regression model
//! over the features split on along its path.
//!
//! # Key Types
//!
//! - [`LinearTreeLearner`] / [`LinearTreeParams`] - Training
//! - [`LinearObliviousTree`] - The trained model
//! - [`Grid`], [`SamplesView`], [`BinarizedDataSet`] - Data inputs
//!
//! # Training
//!
//! Build a [`Grid`] from borders, configure with `LinearTreeParams::builder()`,
//! then call [`LinearTreeLearner::fit`]. Progress is reported through `tracing`
//! according to [`Verbosity`].

// Re-export approx traits for users who want to compare predictions
pub use approx;

pub mod data;
pub mod model;
pub mod repr;
pub mod testing;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use model::{Model, ModelError};
pub use repr::{LeafModel, LinearObliviousTree, Split};

pub use training::{
    Learner, LinearTreeLearner, LinearTreeParams, TrainError, TrainingLogger, Verbosity,
};

pub use data::{BinarizedDataSet, DataSet, DatasetError, Grid, GridError, SamplesView, Target};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
