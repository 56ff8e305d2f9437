//! State of one training run.
//!
//! A [`TrainingSession`] is built fresh for every fit and owns everything that
//! changes while the tree grows: cached columns, the sample → leaf map, the
//! frontier leaves and the histogram pool.
//!
//! # Level step
//!
//! 1. Correlate every unused grid feature with the used ones, per (leaf, bin).
//! 2. Prefix-sum and feed those rows into each leaf's candidate slot.
//! 3. Score all admissible (feature, condition) pairs and keep the minimum.
//! 4. Route every sample to child `2·id` or `2·id + 1` and count children.
//! 5. Rescan the smaller child of each pair; derive the other from the parent.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use super::buffers::{CrossBuffer, Partials, StatBuffer};
#[cfg(test)]
use super::histogram::Histogram;
use super::leaf::{Leaf, UsedFeatures};
use super::params::LinearTreeParams;
use super::pool::HistogramPool;
use super::stat::CorrelationSlot;
use super::TrainError;
use crate::data::{BinarizedDataSet, DataSet, DatasetError, Grid};
use crate::repr::{LinearObliviousTree, Split};
use crate::training::logger::{timed, LevelSummary, TrainingLogger};
use crate::utils::{sample_blocks, Parallelism};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Uninitialized,
    RootBuilt,
    Growing { depth: usize },
    Finalized,
}

/// How a child's histogram is restated after a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateMode {
    /// Full scan of the child's samples.
    Rescan,
    /// Parent minus the rescanned sibling, plus a scan of the new feature only.
    Derive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BestSplit {
    feature: usize,
    condition: usize,
    score: f64,
}

/// Used-feature rows of samples, read from the column cache.
#[derive(Clone, Copy)]
struct SampleRows<'s> {
    bias: &'s [f32],
    columns: &'s [Vec<f32>],
    order: &'s [usize],
}

impl SampleRows<'_> {
    #[inline]
    fn fill(&self, sample: usize, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.order.len() + 1);
        out[0] = self.bias[sample] as f64;
        for (slot, &f) in out[1..].iter_mut().zip(self.order) {
            *slot = self.columns[f][sample] as f64;
        }
    }
}

/// One block's buffers in the restatement pass.
struct LevelPartial<'p> {
    stats: &'p mut StatBuffer,
    cross: Option<&'p mut CrossBuffer>,
}

impl LevelPartial<'_> {
    fn merge(&mut self, other: &LevelPartial<'_>) {
        self.stats.merge(&*other.stats);
        if let (Some(lhs), Some(rhs)) = (&mut self.cross, &other.cross) {
            lhs.merge(&**rhs);
        }
    }
}

/// Scan each block into its recycled partial, then reduce into the first one.
fn accumulate_into<B, S>(
    parallelism: Parallelism,
    blocks: &[Range<usize>],
    partials: &mut [B],
    scan: S,
    merge: impl Fn(&mut B, &B),
) where
    B: Send,
    S: Fn(&mut B, Range<usize>) + Sync + Send,
{
    debug_assert!(partials.len() >= blocks.len());
    parallelism.maybe_par_for_each_mut(partials, |i, partial| {
        if let Some(range) = blocks.get(i) {
            scan(partial, range.clone());
        }
    });
    if let Some((acc, rest)) = partials.split_first_mut() {
        for partial in rest.iter() {
            merge(acc, partial);
        }
    }
}

/// Every cached column must be finite.
fn check_finite(column: &[f32], feature: usize) -> Result<(), DatasetError> {
    match column.iter().position(|v| !v.is_finite()) {
        Some(sample) => Err(DatasetError::NonFinite { sample, feature }),
        None => Ok(()),
    }
}

/// Scan sample blocks into per-worker partials and reduce them.
fn accumulate<B, M, S>(
    parallelism: Parallelism,
    blocks: Vec<Range<usize>>,
    make: M,
    scan: S,
    merge: impl Fn(&mut B, &B),
) -> B
where
    B: Send,
    M: Fn() -> B + Sync + Send,
    S: Fn(&mut B, Range<usize>) + Sync + Send,
{
    let partials = parallelism.maybe_par_map(blocks, |range| {
        let mut partial = make();
        scan(&mut partial, range);
        partial
    });
    let mut partials = partials.into_iter();
    let mut acc = partials.next().unwrap_or_else(&make);
    for partial in partials {
        merge(&mut acc, &partial);
    }
    acc
}

pub(crate) struct TrainingSession<'a> {
    params: &'a LinearTreeParams,
    grid: Arc<Grid>,
    bins: &'a BinarizedDataSet,
    targets: &'a [f32],
    parallelism: Parallelism,
    logger: TrainingLogger,
    pool: HistogramPool,
    partials: Partials,

    /// Raw values of every grid feature, copied once per run.
    columns: Vec<Vec<f32>>,
    bias: Vec<f32>,

    used: UsedFeatures,
    applied: BTreeSet<(usize, usize)>,
    leaf_of: Vec<u32>,
    leaves: Vec<Leaf>,
    depth: usize,
    stage: Stage,
}

impl<'a> TrainingSession<'a> {
    /// Caller has validated shapes and `bias_column`. Fails on a non-finite
    /// value in the bias column or any grid feature.
    pub fn new<D: DataSet + ?Sized>(
        params: &'a LinearTreeParams,
        grid: Arc<Grid>,
        dataset: &D,
        bins: &'a BinarizedDataSet,
        targets: &'a [f32],
        bias_column: usize,
        parallelism: Parallelism,
    ) -> Result<Self, TrainError> {
        let mut columns = vec![Vec::new(); grid.n_features()];
        parallelism.maybe_par_for_each_mut(&mut columns, |f, column| {
            dataset.copy_column(grid.orig_feature_index(f), column);
        });
        let mut bias = Vec::new();
        dataset.copy_column(bias_column, &mut bias);
        check_finite(&bias, bias_column)?;
        for (f, column) in columns.iter().enumerate() {
            check_finite(column, grid.orig_feature_index(f))?;
        }

        let bias_grid =
            (0..grid.n_features()).find(|&f| grid.orig_feature_index(f) == bias_column);

        Ok(Self {
            params,
            pool: HistogramPool::new(Arc::clone(&grid), params.stat_capacity()),
            partials: Partials::new(grid.total_bins(), params.stat_capacity()),
            grid,
            bins,
            targets,
            parallelism,
            logger: TrainingLogger::new(params.verbosity),
            columns,
            bias,
            used: UsedFeatures::with_bias(bias_column, bias_grid),
            applied: BTreeSet::new(),
            leaf_of: Vec::new(),
            leaves: Vec::new(),
            depth: 0,
            stage: Stage::Uninitialized,
        })
    }

    /// Grow to `max_depth` (or until no split is left) and fit the leaves.
    pub fn run(mut self) -> Result<LinearObliviousTree, TrainError> {
        self.logger.start_training(
            self.targets.len(),
            self.grid.n_features(),
            self.params.max_depth,
        );
        self.build_root();
        while self.depth < self.params.max_depth {
            if !self.grow_level() {
                break;
            }
        }
        self.finalize()
    }

    #[inline]
    fn n_samples(&self) -> usize {
        self.targets.len()
    }

    fn rows(&self) -> SampleRows<'_> {
        SampleRows {
            bias: &self.bias,
            columns: &self.columns,
            order: self.used.grid_features(),
        }
    }

    fn blocks(&self) -> Vec<Range<usize>> {
        sample_blocks(self.n_samples(), self.parallelism.n_blocks())
    }

    // =========================================================================
    // Root
    // =========================================================================

    /// One full pass over every sample with only the bias in use.
    pub fn build_root(&mut self) {
        debug_assert_eq!(self.stage, Stage::Uninitialized);
        let grid = Arc::clone(&self.grid);
        let (bins, targets) = (self.bins, self.targets);
        let blocks = self.blocks();
        let mut partials = std::mem::take(&mut self.partials);
        partials.reset_stats(blocks.len(), 1, 1);
        let rows = self.rows();

        timed(&self.logger, 0, "root_scan", || {
            accumulate_into(
                self.parallelism,
                &blocks,
                partials.stats_mut(),
                |buf, range| {
                    let mut x = [0.0];
                    for sample in range {
                        rows.fill(sample, &mut x);
                        let y = targets[sample] as f64;
                        for (f, &bin) in bins.sample_bins(sample).iter().enumerate() {
                            buf.add(0, grid.bin_offsets()[f] + bin as usize, &x, y);
                        }
                    }
                },
                StatBuffer::merge,
            )
        });

        let mut hist = self.pool.acquire(1, None);
        for (bin, stat) in partials.stats_total().slot(0).iter().enumerate() {
            hist.add_bin_stat(bin, stat);
        }
        self.partials = partials;
        hist.prefix_sum_bins(self.parallelism);

        self.leaves = vec![Leaf::root(
            self.used.clone(),
            hist,
            self.params.l2_reg,
            self.params.trace_reg,
        )];
        self.leaf_of = vec![0; self.n_samples()];
        self.pool.advance();
        self.stage = Stage::RootBuilt;
    }

    // =========================================================================
    // Level growth
    // =========================================================================

    /// Apply one split to every leaf. Returns `false` when no split is left.
    pub fn grow_level(&mut self) -> bool {
        debug_assert!(matches!(
            self.stage,
            Stage::RootBuilt | Stage::Growing { .. }
        ));
        let depth = self.depth;

        let candidates: Vec<usize> = (0..self.grid.n_features())
            .filter(|&f| !self.used.contains(f))
            .collect();
        if !candidates.is_empty() {
            let mut partials = std::mem::take(&mut self.partials);
            timed(&self.logger, depth, "correlate", || {
                self.correlate_candidates(&mut partials, &candidates)
            });
            self.feed_candidates(partials.cross_total(), &candidates);
            self.partials = partials;
        }

        let best = timed(&self.logger, depth, "score", || self.find_best_split());
        let Some(best) = best else {
            self.logger.log_no_split(depth);
            return false;
        };

        let start = Instant::now();
        let counts = self.partition(&best);
        self.logger.log_phase(depth, "partition", start.elapsed());

        let modes = self.update_modes(&counts);
        let n_rescanned = modes.iter().filter(|&&m| m == UpdateMode::Rescan).count();

        let start = Instant::now();
        self.split_leaves(&best, &modes);
        self.logger.log_phase(depth, "restate", start.elapsed());

        self.applied.insert((best.feature, best.condition));
        self.depth += 1;
        self.stage = Stage::Growing { depth: self.depth };
        self.logger.log_level(&LevelSummary {
            depth,
            feature: best.feature,
            condition: best.condition,
            border: self.grid.condition(best.feature, best.condition),
            score: best.score,
            n_leaves: self.leaves.len(),
            n_rescanned,
        });
        true
    }

    /// Cross-products of each candidate feature with the used features.
    fn correlate_candidates(&self, partials: &mut Partials, candidates: &[usize]) {
        let grid = &*self.grid;
        let n_leaves = self.leaves.len();
        let filled = self.used.len();
        let (bins, targets, leaf_of) = (self.bins, self.targets, &self.leaf_of);
        let columns = &self.columns;
        let rows = self.rows();
        let blocks = self.blocks();
        partials.reset_cross(blocks.len(), n_leaves, filled + 1);

        accumulate_into(
            self.parallelism,
            &blocks,
            partials.cross_mut(),
            |buf, range| {
                let mut x = vec![0.0; filled];
                for sample in range {
                    rows.fill(sample, &mut x);
                    let leaf = leaf_of[sample] as usize;
                    let y = targets[sample] as f64;
                    let sample_bins = bins.sample_bins(sample);
                    for &f in candidates {
                        let bin = grid.bin_offsets()[f] + sample_bins[f] as usize;
                        buf.add(leaf, bin, &x, columns[f][sample] as f64, y);
                    }
                }
            },
            CrossBuffer::merge,
        );
        partials.cross_total_mut().prefix_sum(grid, candidates);
    }

    fn feed_candidates(&mut self, cross: &CrossBuffer, candidates: &[usize]) {
        let grid = &*self.grid;
        self.parallelism
            .maybe_par_for_each_mut(&mut self.leaves, |leaf_idx, leaf| {
                let hist = leaf.histogram_mut();
                for &f in candidates {
                    for bin in grid.feature_bins(f) {
                        hist.add_new_correlation(
                            bin,
                            cross.row(leaf_idx, bin),
                            cross.xty(leaf_idx, bin),
                            CorrelationSlot::Candidate,
                        );
                    }
                }
            });
    }

    /// Lowest summed score; ties keep the first pair in (feature, condition) order.
    fn find_best_split(&self) -> Option<BestSplit> {
        let grid = &*self.grid;
        let (leaves, applied) = (&self.leaves, &self.applied);

        let per_feature = self
            .parallelism
            .maybe_par_map(0..grid.n_features(), |feature| {
                let mut best: Option<BestSplit> = None;
                for condition in 0..grid.conditions_count(feature) {
                    if applied.contains(&(feature, condition)) {
                        continue;
                    }
                    let score: f64 = leaves
                        .iter()
                        .map(|leaf| leaf.split_score(feature, condition))
                        .sum();
                    if score < best.map_or(f64::INFINITY, |b| b.score) {
                        best = Some(BestSplit {
                            feature,
                            condition,
                            score,
                        });
                    }
                }
                best
            });

        per_feature.into_iter().flatten().fold(None, |best, cand| match best {
            Some(b) if b.score <= cand.score => Some(b),
            _ => Some(cand),
        })
    }

    /// Route samples to children and count each child.
    fn partition(&mut self, best: &BestSplit) -> Vec<u32> {
        let border = self.grid.condition(best.feature, best.condition);
        let column = &self.columns[best.feature];
        self.parallelism
            .maybe_par_for_each_mut(&mut self.leaf_of, |sample, id| {
                *id = if column[sample] <= border {
                    2 * *id
                } else {
                    2 * *id + 1
                };
            });

        let n_children = 2 * self.leaves.len();
        let leaf_of = &self.leaf_of;
        accumulate(
            self.parallelism,
            self.blocks(),
            || vec![0u32; n_children],
            |counts, range| {
                for sample in range {
                    counts[leaf_of[sample] as usize] += 1;
                }
            },
            |acc: &mut Vec<u32>, other: &Vec<u32>| {
                for (a, b) in acc.iter_mut().zip(other) {
                    *a += b;
                }
            },
        )
    }

    /// The smaller child of each pair is rescanned; the left one on ties.
    fn update_modes(&self, counts: &[u32]) -> Vec<UpdateMode> {
        if !self.params.histogram_subtraction {
            return vec![UpdateMode::Rescan; counts.len()];
        }
        counts
            .chunks(2)
            .flat_map(|pair| {
                if pair[0] <= pair[1] {
                    [UpdateMode::Rescan, UpdateMode::Derive]
                } else {
                    [UpdateMode::Derive, UpdateMode::Rescan]
                }
            })
            .collect()
    }

    /// Replace the frontier with the children of `best`.
    fn split_leaves(&mut self, best: &BestSplit, modes: &[UpdateMode]) {
        let grid = Arc::clone(&self.grid);
        let filled = self.used.len();
        let grows = !self.used.contains(best.feature);
        let new_filled = filled + usize::from(grows);
        let split = Split {
            feature: best.feature,
            orig_feature: grid.orig_feature_index(best.feature),
            condition: best.condition,
            border: grid.condition(best.feature, best.condition),
            is_left: true,
        };

        let parents = std::mem::take(&mut self.leaves);
        let mut children = Vec::with_capacity(2 * parents.len());
        for parent in &parents {
            let left = self.pool.acquire(new_filled, Some(best.feature));
            let right = self.pool.acquire(new_filled, Some(best.feature));
            let (left, right) = parent.split(split, left, right);
            children.push(left);
            children.push(right);
        }
        self.used.insert(split.feature, split.orig_feature);

        let mut partials = std::mem::take(&mut self.partials);
        let with_cross = self.scan_children(&mut partials, modes, grows);
        let stats = partials.stats_total();
        let cross = with_cross.then(|| partials.cross_total());

        let subtraction = self.params.histogram_subtraction;
        let mut pairs: Vec<&mut [Leaf]> = children.chunks_mut(2).collect();
        self.parallelism.maybe_par_for_each_mut(&mut pairs, |p, pair| {
            let modes = &modes[2 * p..2 * p + 2];
            restate_pair(&parents[p], pair, modes, stats, cross, p, subtraction);
        });
        self.partials = partials;

        self.pool
            .release(parents.into_iter().map(Leaf::into_histogram));
        self.pool.advance();
        self.leaves = children;
    }

    /// One pass over all samples: full statistics of rescanned children, and
    /// the new feature's row for derived children when the feature set grew.
    ///
    /// Totals land in the first partial of each kind. Returns whether the
    /// cross partials were part of the pass.
    fn scan_children(&self, partials: &mut Partials, modes: &[UpdateMode], grows: bool) -> bool {
        let grid = &*self.grid;
        let n_pairs = modes.len() / 2;
        let filled = self.used.len();
        let subtraction = self.params.histogram_subtraction;
        let n_slots = if subtraction { n_pairs } else { 2 * n_pairs };
        let with_cross = grows && subtraction;
        let (bins, targets, leaf_of) = (self.bins, self.targets, &self.leaf_of);
        let rows = self.rows();
        let blocks = self.blocks();

        partials.reset_stats(blocks.len(), n_slots, filled);
        if with_cross {
            partials.reset_cross(blocks.len(), n_pairs, filled);
        }
        let (stats, cross) = partials.both_mut();
        let mut level: Vec<LevelPartial<'_>> = if with_cross {
            stats
                .iter_mut()
                .zip(cross.iter_mut())
                .map(|(stats, cross)| LevelPartial {
                    stats,
                    cross: Some(cross),
                })
                .collect()
        } else {
            stats
                .iter_mut()
                .map(|stats| LevelPartial { stats, cross: None })
                .collect()
        };

        accumulate_into(
            self.parallelism,
            &blocks,
            &mut level,
            |buf, range| {
                let mut x = vec![0.0; filled];
                for sample in range {
                    let child = leaf_of[sample] as usize;
                    let y = targets[sample] as f64;
                    let sample_bins = bins.sample_bins(sample);
                    match (modes[child], &mut buf.cross) {
                        (UpdateMode::Rescan, _) => {
                            rows.fill(sample, &mut x);
                            let slot = rescan_slot(child, subtraction);
                            for (f, &bin) in sample_bins.iter().enumerate() {
                                let bin = grid.bin_offsets()[f] + bin as usize;
                                buf.stats.add(slot, bin, &x, y);
                            }
                        }
                        (UpdateMode::Derive, Some(cross)) => {
                            rows.fill(sample, &mut x);
                            let (old, new) = x.split_at(filled - 1);
                            for (f, &bin) in sample_bins.iter().enumerate() {
                                let bin = grid.bin_offsets()[f] + bin as usize;
                                cross.add(child / 2, bin, old, new[0], y);
                            }
                        }
                        (UpdateMode::Derive, None) => {}
                    }
                }
            },
            LevelPartial::merge,
        );
        drop(level);

        if with_cross {
            let all: Vec<usize> = (0..grid.n_features()).collect();
            partials.cross_total_mut().prefix_sum(grid, &all);
        }
        with_cross
    }

    // =========================================================================
    // Finalize
    // =========================================================================

    /// Fit every leaf and freeze the tree.
    pub fn finalize(mut self) -> Result<LinearObliviousTree, TrainError> {
        debug_assert_ne!(self.stage, Stage::Finalized);
        timed(&self.logger, self.depth, "fit", || {
            self.parallelism
                .maybe_par_try_for_each_mut(&mut self.leaves, Leaf::fit)
        })?;
        self.stage = Stage::Finalized;
        self.logger.finish_training(self.depth, self.leaves.len());

        let leaves = self
            .leaves
            .into_iter()
            .map(Leaf::into_model)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LinearObliviousTree::new(leaves))
    }
}

#[inline]
fn rescan_slot(child: usize, subtraction: bool) -> usize {
    if subtraction {
        child / 2
    } else {
        child
    }
}

/// Fill both children of parent `p` from the scanned buffers.
fn restate_pair(
    parent: &Leaf,
    pair: &mut [Leaf],
    modes: &[UpdateMode],
    stats: &StatBuffer,
    cross: Option<&CrossBuffer>,
    p: usize,
    subtraction: bool,
) {
    for (side, child) in pair.iter_mut().enumerate() {
        debug_assert_eq!(
            child.histogram().generation(),
            parent.histogram().generation().wrapping_add(1)
        );
        if modes[side] == UpdateMode::Rescan {
            let hist = child.histogram_mut();
            let scanned = stats.slot(rescan_slot(2 * p + side, subtraction));
            for (bin, stat) in scanned.iter().enumerate() {
                hist.add_bin_stat(bin, stat);
            }
            hist.prefix_sum_bins(Parallelism::Sequential);
        }
    }

    let Some(derived_side) = modes.iter().position(|&m| m == UpdateMode::Derive) else {
        return;
    };
    let (head, tail) = pair.split_at_mut(1);
    let (scanned, derived) = if derived_side == 0 {
        (&tail[0], &mut head[0])
    } else {
        (&head[0], &mut tail[0])
    };

    let hist = derived.histogram_mut();
    if let Some(cross) = cross {
        for bin in 0..hist.grid().total_bins() {
            let (row, xty) = (cross.row(p, bin), cross.xty(p, bin));
            hist.add_new_correlation(bin, row, xty, CorrelationSlot::Last);
        }
    }
    *hist += &(parent.histogram() - scanned.histogram());
}

#[cfg(test)]
impl TrainingSession<'_> {
    /// Histogram of leaf `leaf` computed from scratch.
    fn rescan_histogram(&self, leaf: usize) -> Histogram {
        let grid = Arc::clone(&self.grid);
        let filled = self.used.len();
        let last_used = self.leaves[leaf].histogram().last_used_feature();
        let capacity = self.params.stat_capacity();
        let mut hist = Histogram::new(Arc::clone(&grid), capacity, filled, last_used);
        let mut stats = StatBuffer::new(1, grid.total_bins(), capacity, filled);
        let rows = self.rows();
        let mut x = vec![0.0; filled];
        for sample in 0..self.n_samples() {
            if self.leaf_of[sample] as usize != leaf {
                continue;
            }
            rows.fill(sample, &mut x);
            let y = self.targets[sample] as f64;
            for (f, &bin) in self.bins.sample_bins(sample).iter().enumerate() {
                stats.add(0, grid.bin_offsets()[f] + bin as usize, &x, y);
            }
        }
        for (bin, stat) in stats.slot(0).iter().enumerate() {
            hist.add_bin_stat(bin, stat);
        }
        hist.prefix_sum_bins(Parallelism::Sequential);
        hist
    }
}
