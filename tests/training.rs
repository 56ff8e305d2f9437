//! Integration tests grouped by training subsystem.

#[path = "training/linear_tree.rs"]
mod linear_tree;

// Randomized invariants over small synthetic datasets.
#[path = "training/properties.rs"]
mod properties;
