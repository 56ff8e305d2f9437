//! Property-based tests for tree growth.
//!
//! Random small datasets; the tree must always partition the samples and give
//! finite outputs.

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use linear_oblivious_tree::data::{Grid, SamplesView};
use linear_oblivious_tree::training::{LinearTreeLearner, LinearTreeParams, Verbosity};
use linear_oblivious_tree::Model;

const N_FEATURES: usize = 3;

#[derive(Debug, Clone)]
struct Problem {
    data: Vec<f32>,
    targets: Vec<f32>,
    max_depth: usize,
    subtraction: bool,
}

impl Problem {
    fn n_samples(&self) -> usize {
        self.targets.len()
    }

    fn sample(&self, i: usize) -> &[f32] {
        &self.data[i * N_FEATURES..(i + 1) * N_FEATURES]
    }
}

/// Rows are `[1.0, x1, x2]` with `x` in `[0, 1)`.
fn arb_problem() -> impl Strategy<Value = Problem> {
    (8usize..40, 1usize..=3, any::<bool>()).prop_flat_map(|(n, max_depth, subtraction)| {
        (
            prop_vec((0.0f32..1.0, 0.0f32..1.0), n),
            prop_vec(-5.0f32..5.0, n),
        )
            .prop_map(move |(xs, targets)| Problem {
                data: xs.iter().flat_map(|&(a, b)| [1.0, a, b]).collect(),
                targets,
                max_depth,
                subtraction,
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every sample falls in exactly one leaf and gets a finite value.
    #[test]
    fn leaves_partition_samples(problem in arb_problem()) {
        let samples = SamplesView::from_slice(&problem.data, problem.n_samples(), N_FEATURES).unwrap();
        let grid = Grid::from_borders(vec![vec![], vec![0.25, 0.5, 0.75], vec![0.25, 0.5, 0.75]]).unwrap();
        let params = LinearTreeParams::builder()
            .max_depth(problem.max_depth)
            .bias_feature(0)
            .histogram_subtraction(problem.subtraction)
            .n_threads(1)
            .verbosity(Verbosity::Silent)
            .build();

        let tree = LinearTreeLearner::new(params, grid).unwrap().fit(&samples, &problem.targets).unwrap();

        prop_assert!(tree.depth() >= 1 && tree.depth() <= problem.max_depth);
        prop_assert_eq!(tree.leaves().len(), 1 << tree.depth());

        for i in 0..problem.n_samples() {
            let x = problem.sample(i);
            let owners = tree.leaves().iter().filter(|leaf| leaf.is_in_region(x)).count();
            prop_assert_eq!(owners, 1, "sample {} owned by {} leaves", i, owners);
            let value = tree.value(x).unwrap();
            prop_assert!(value.is_finite(), "sample {} has value {}", i, value);
        }
        for leaf in tree.leaves() {
            prop_assert!(leaf.weights().iter().all(|w| w.is_finite()));
        }
    }
}
