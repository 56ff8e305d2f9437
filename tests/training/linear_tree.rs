//! Linear oblivious tree training integration tests.
//!
//! Focused on behavior and invariants of fitted trees.

use approx::assert_abs_diff_eq;
use rand::prelude::*;
use rstest::rstest;

use linear_oblivious_tree::data::{BinarizedDataSet, Grid, SamplesView};
use linear_oblivious_tree::testing::{assert_predictions_eq, assert_slice_approx_eq_f64};
use linear_oblivious_tree::training::{Learner, LinearTreeLearner, LinearTreeParams, Verbosity};
use linear_oblivious_tree::{DatasetError, LinearObliviousTree, Model, Parallelism, TrainError};

/// Bias column followed by `x`.
fn with_bias(xs: &[f32]) -> Vec<f32> {
    xs.iter().flat_map(|&x| [1.0, x]).collect()
}

/// `(data, targets)` with a bias column and `n_features - 1` uniform features.
fn random_regression(n_samples: usize, n_features: usize, seed: u64) -> (Vec<f32>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(n_samples * n_features);
    let mut targets = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        data.push(1.0);
        let mut y = 0.5;
        for f in 1..n_features {
            let x: f32 = rng.gen_range(0.0..1.0);
            data.push(x);
            y += if x < 0.5 { f as f32 * x } else { 2.0 - x };
        }
        targets.push(y + rng.gen_range(-0.01..0.01));
    }
    (data, targets)
}

fn uniform_grid(n_features: usize) -> Grid {
    let mut borders = vec![vec![]];
    borders.extend((1..n_features).map(|_| vec![0.2, 0.4, 0.5, 0.6, 0.8]));
    Grid::from_borders(borders).unwrap()
}

fn params(max_depth: usize) -> LinearTreeParams {
    LinearTreeParams::builder()
        .max_depth(max_depth)
        .bias_feature(0)
        .n_threads(1)
        .verbosity(Verbosity::Silent)
        .build()
}

fn assert_same_tree(a: &LinearObliviousTree, b: &LinearObliviousTree) {
    assert_eq!(a.leaves().len(), b.leaves().len());
    for (la, lb) in a.leaves().iter().zip(b.leaves()) {
        assert_eq!(la.splits(), lb.splits());
        assert_eq!(la.columns(), lb.columns());
        assert_slice_approx_eq_f64(la.weights(), lb.weights(), 1e-6, "weights");
    }
}

#[test]
fn fits_exact_piecewise_linear_stump() {
    // left: y = 1 + 2x, right: y = 6 - 3x, separated at 0.5
    let xs = [0.0, 0.2, 0.8, 1.0];
    let data = with_bias(&xs);
    let targets = vec![1.0f32, 1.4, 3.6, 3.0];
    let samples = SamplesView::from_slice(&data, 4, 2).unwrap();
    let grid = Grid::from_borders(vec![vec![], vec![0.1, 0.5, 0.9]]).unwrap();

    let params = LinearTreeParams::builder()
        .max_depth(1)
        .l2_reg(0.0)
        .bias_feature(0)
        .build();
    let tree = LinearTreeLearner::new(params, grid)
        .unwrap()
        .fit(&samples, &targets)
        .unwrap();

    assert_eq!(tree.depth(), 1);
    let [left, right] = tree.leaves() else {
        panic!("expected two leaves, got {}", tree.leaves().len());
    };
    let split = left.splits()[0];
    assert_eq!((split.feature, split.orig_feature, split.condition), (0, 1, 1));
    assert_eq!(split.border, 0.5);
    assert!(split.is_left && !right.splits()[0].is_left);

    assert_eq!(left.columns(), &[0, 1]);
    assert_slice_approx_eq_f64(left.weights(), &[1.0, 2.0], 1e-3, "left weights");
    assert_slice_approx_eq_f64(right.weights(), &[6.0, -3.0], 1e-3, "right weights");

    for (i, &y) in targets.iter().enumerate() {
        let value = tree.value(&data[2 * i..2 * i + 2]).unwrap();
        assert_abs_diff_eq!(value, y as f64, epsilon = 1e-4);
    }
}

#[test]
fn refit_is_deterministic() {
    let (data, targets) = random_regression(300, 4, 42);
    let samples = SamplesView::from_slice(&data, 300, 4).unwrap();
    let learner = LinearTreeLearner::new(params(3), uniform_grid(4)).unwrap();

    let a = learner.fit(&samples, &targets).unwrap();
    let b = learner.fit(&samples, &targets).unwrap();
    assert_eq!(a, b);
}

#[rstest]
#[case::two_threads(2)]
#[case::four_threads(4)]
#[case::rayon_default(0)]
fn parallel_matches_sequential(#[case] n_threads: usize) {
    let (data, targets) = random_regression(500, 5, 7);
    let samples = SamplesView::from_slice(&data, 500, 5).unwrap();

    let sequential = LinearTreeLearner::new(params(4), uniform_grid(5))
        .unwrap()
        .fit(&samples, &targets)
        .unwrap();
    let parallel_params = LinearTreeParams {
        n_threads,
        ..params(4)
    };
    let parallel = LinearTreeLearner::new(parallel_params, uniform_grid(5))
        .unwrap()
        .fit(&samples, &targets)
        .unwrap();

    assert_same_tree(&sequential, &parallel);
}

#[test]
fn subtraction_matches_full_rescan() {
    let (data, targets) = random_regression(400, 4, 99);
    let samples = SamplesView::from_slice(&data, 400, 4).unwrap();

    let derived = LinearTreeLearner::new(params(4), uniform_grid(4))
        .unwrap()
        .fit(&samples, &targets)
        .unwrap();
    let rescanned_params = LinearTreeParams {
        histogram_subtraction: false,
        ..params(4)
    };
    let rescanned = LinearTreeLearner::new(rescanned_params, uniform_grid(4))
        .unwrap()
        .fit(&samples, &targets)
        .unwrap();

    assert_same_tree(&derived, &rescanned);
}

#[test]
fn reuses_single_feature_across_levels() {
    let xs: Vec<f32> = (0..40).map(|i| i as f32 / 40.0).collect();
    let data = with_bias(&xs);
    let targets: Vec<f32> = xs
        .iter()
        .map(|&x| if x <= 0.5 { 3.0 * x } else { 4.0 - x })
        .collect();
    let samples = SamplesView::from_slice(&data, xs.len(), 2).unwrap();
    let grid = Grid::from_borders(vec![vec![], vec![0.25, 0.5, 0.75]]).unwrap();

    let tree = LinearTreeLearner::new(params(2), grid)
        .unwrap()
        .fit(&samples, &targets)
        .unwrap();

    assert_eq!(tree.depth(), 2);
    assert_eq!(tree.leaves().len(), 4);
    for leaf in tree.leaves() {
        // feature set does not grow on the second split
        assert_eq!(leaf.columns(), &[0, 1]);
        assert_ne!(leaf.splits()[0].condition, leaf.splits()[1].condition);
    }
    for i in 0..xs.len() {
        assert!(tree.value(&data[2 * i..2 * i + 2]).unwrap().is_finite());
    }
}

#[test]
fn stops_early_when_no_split_is_left() {
    let xs = [0.1, 0.3, 0.6, 0.9];
    let data = with_bias(&xs);
    let targets = vec![0.0f32, 1.0, 2.0, 2.5];
    let samples = SamplesView::from_slice(&data, 4, 2).unwrap();
    let grid = Grid::from_borders(vec![vec![], vec![0.5]]).unwrap();

    let tree = LinearTreeLearner::new(params(3), grid)
        .unwrap()
        .fit(&samples, &targets)
        .unwrap();

    assert_eq!(tree.depth(), 1);
    assert_eq!(tree.leaves().len(), 2);
}

#[test]
fn grid_without_features_cannot_fit() {
    let data = with_bias(&[0.1, 0.9]);
    let samples = SamplesView::from_slice(&data, 2, 2).unwrap();
    let grid = Grid::from_borders(vec![vec![], vec![]]).unwrap();

    let result = LinearTreeLearner::new(params(2), grid)
        .unwrap()
        .fit(&samples, &vec![1.0f32, 2.0]);
    assert!(matches!(result, Err(TrainError::NoFeaturesUsed)));
}

#[test]
fn batch_predict_matches_single_values() {
    let (data, targets) = random_regression(120, 3, 5);
    let samples = SamplesView::from_slice(&data, 120, 3).unwrap();
    let tree = LinearTreeLearner::new(params(3), uniform_grid(3))
        .unwrap()
        .fit(&samples, &targets)
        .unwrap()
        .with_scale(0.5);

    let expected: Vec<f64> = (0..120)
        .map(|i| tree.value(&data[3 * i..3 * i + 3]).unwrap())
        .collect();
    for parallelism in [Parallelism::Sequential, Parallelism::Parallel] {
        let batch = tree.predict(samples, parallelism).unwrap();
        assert_predictions_eq(batch.view(), &expected, 1e-12);
    }

    let unscaled = tree.clone().with_scale(1.0);
    let mut acc = 0.0;
    unscaled.append_to(&data[..3], &mut acc).unwrap();
    assert_abs_diff_eq!(acc, 2.0 * expected[0], epsilon = 1e-9);
}

#[test]
fn fit_binned_reuses_bins_across_targets() {
    let (data, targets) = random_regression(200, 3, 8);
    let samples = SamplesView::from_slice(&data, 200, 3).unwrap();
    let learner = LinearTreeLearner::new(params(2), uniform_grid(3)).unwrap();
    let bins = BinarizedDataSet::new(&samples, learner.grid(), Parallelism::Sequential).unwrap();

    let shifted: Vec<f32> = targets.iter().map(|y| y - 1.0).collect();
    for target in [&targets, &shifted] {
        let direct = learner.fit(&samples, target).unwrap();
        let cached = learner.fit_binned(&samples, &bins, target).unwrap();
        assert_eq!(direct, cached);
    }
}

#[test]
fn fit_binned_rejects_bins_from_another_grid() {
    let (data, targets) = random_regression(100, 3, 4);
    let samples = SamplesView::from_slice(&data, 100, 3).unwrap();
    let learner = LinearTreeLearner::new(params(2), uniform_grid(3)).unwrap();

    let borders: Vec<f32> = (1..=9).map(|k| k as f32 / 10.0).collect();
    let finer = Grid::from_borders(vec![vec![], borders.clone(), borders]).unwrap();
    let bins = BinarizedDataSet::new(&samples, &finer, Parallelism::Sequential).unwrap();

    let result = learner.fit_binned(&samples, &bins, &targets);
    assert!(matches!(
        result,
        Err(TrainError::Dataset(DatasetError::BinnedBinsMismatch {
            feature: 1,
            grid: 6,
            binned: 10
        }))
    ));
}

#[test]
fn non_finite_feature_is_rejected() {
    let xs = [0.1, 0.2, 0.4, f32::NAN, 0.7, 0.9];
    let data = with_bias(&xs);
    let targets = vec![0.1f32, 0.2, 0.4, 0.5, 1.4, 1.8];
    let samples = SamplesView::from_slice(&data, 6, 2).unwrap();
    let grid = Grid::from_borders(vec![vec![], vec![0.25, 0.5, 0.75]]).unwrap();

    let result = LinearTreeLearner::new(params(2), grid)
        .unwrap()
        .fit(&samples, &targets);
    assert!(matches!(
        result,
        Err(TrainError::Dataset(DatasetError::NonFinite {
            sample: 3,
            feature: 1
        }))
    ));
}

fn fit_with<L: Learner>(learner: &L, samples: &SamplesView<'_>, targets: &[f32]) -> L::Model {
    learner.fit(samples, targets).unwrap()
}

#[test]
fn usable_through_learner_trait() {
    let (data, targets) = random_regression(64, 3, 1);
    let samples = SamplesView::from_slice(&data, 64, 3).unwrap();
    let learner = LinearTreeLearner::new(params(2), uniform_grid(3)).unwrap();

    let model = fit_with(&learner, &samples, &targets);
    assert_eq!(model.n_features(), 3);
    assert!(model.value(&data[..3]).unwrap().is_finite());
}

#[test]
fn emits_tracing_events_when_verbose() {
    let (data, targets) = random_regression(64, 3, 2);
    let samples = SamplesView::from_slice(&data, 64, 3).unwrap();
    let params = LinearTreeParams {
        verbosity: Verbosity::Debug,
        ..params(2)
    };
    let learner = LinearTreeLearner::new(params, uniform_grid(3)).unwrap();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    let tree = tracing::subscriber::with_default(subscriber, || {
        learner.fit(&samples, &targets).unwrap()
    });
    assert_eq!(tree.depth(), 2);
}
