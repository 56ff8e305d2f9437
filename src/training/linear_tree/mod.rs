//! Greedy learner for oblivious trees with linear leaves.
//!
//! Growth is level-wise: at every depth one (feature, condition) split is chosen
//! for all leaves at once, scored by the summed ridge-regression loss of both
//! sides of every leaf. Leaf statistics live in per-leaf [`Histogram`]s of
//! [`BinStat`]s and are carried from level to level by rescanning the smaller
//! child of each pair and subtracting it from the parent for the larger one.
//!
//! - [`LinearTreeLearner`]: entry point
//! - [`LinearTreeParams`]: configuration
//! - [`Histogram`], [`BinStat`], [`Leaf`]: building blocks, exposed for inspection

mod buffers;
mod histogram;
mod leaf;
mod learner;
mod params;
mod pool;
mod ridge;
mod session;
mod stat;

pub use histogram::Histogram;
pub use leaf::{Leaf, UsedFeatures};
pub use learner::{Learner, LinearTreeLearner, TrainError};
pub use params::{LinearTreeParams, MAX_DEPTH_LIMIT};
pub use pool::HistogramPool;
pub use stat::{BinStat, CorrelationSlot};
