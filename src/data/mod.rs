//! Data collaborators of the learner.
//!
//! - [`Grid`]: feature → bin layout built from given borders
//! - [`DataSet`] / [`SamplesView`]: random access to raw feature values
//! - [`BinarizedDataSet`]: per-sample bin indices for a grid
//! - [`Target`]: regression targets

mod binned;
mod dataset;
mod grid;

pub use binned::BinarizedDataSet;
pub use dataset::{DataSet, DatasetError, SamplesView, Target};
pub use grid::{Grid, GridError};
