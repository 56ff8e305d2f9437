//! Trained model representations.

pub mod linear_tree;

pub use linear_tree::{LeafModel, LinearObliviousTree, Split};
