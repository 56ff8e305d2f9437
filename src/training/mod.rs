//! Training infrastructure.
//!
//! - [`LinearTreeLearner`]: grows one linear oblivious tree
//! - [`TrainingLogger`]: verbosity-gated progress output

pub mod linear_tree;
mod logger;

pub use linear_tree::{Learner, LinearTreeLearner, LinearTreeParams, TrainError};
pub use logger::{LevelSummary, TrainingLogger, Verbosity};
