//! Feature grid: the mapping from raw feature values to bins.
//!
//! A grid is built from *given* borders. Choosing borders (quantiles, etc.) is
//! the job of whoever constructs the grid; this module only lays out bins.
//!
//! # Layout
//!
//! Only features with at least one border take part in the grid ("non-zero"
//! features). Each such feature `f` with `c` borders owns `c + 1` bins in a flat
//! bin space starting at `bin_offsets()[f]`:
//!
//! ```text
//! bin k  <=>  borders[k-1] < value <= borders[k]
//! ```
//!
//! so a split on condition `k` sends a sample left exactly when
//! `value <= borders[k]`, i.e. when its bin index is `<= k`.

use std::ops::Range;

/// Errors raised while constructing a [`Grid`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("borders of feature {feature} must be finite")]
    NonFiniteBorder { feature: usize },

    #[error("borders of feature {feature} must be strictly increasing")]
    UnsortedBorders { feature: usize },

    #[error("feature {feature} has {n_borders} borders, at most {max} are supported")]
    TooManyBorders {
        feature: usize,
        n_borders: usize,
        max: usize,
    },

    #[error("original feature {feature} appears more than once in the grid")]
    DuplicateFeature { feature: usize },
}

/// Borders of a single grid feature.
#[derive(Debug, Clone, PartialEq)]
struct GridFeature {
    orig_index: usize,
    borders: Vec<f32>,
}

/// Binning layout shared by every histogram of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    features: Vec<GridFeature>,
    bin_offsets: Vec<usize>,
    total_bins: usize,
}

impl Grid {
    /// Largest number of borders per feature (bins are stored as `u16`).
    pub const MAX_BORDERS: usize = u16::MAX as usize - 1;

    /// Build a grid from `(original_feature_index, borders)` pairs.
    ///
    /// Features with empty borders are dropped. The remaining features keep the
    /// given order and become local features `0..n_features()`.
    pub fn new(features: Vec<(usize, Vec<f32>)>) -> Result<Self, GridError> {
        let mut seen = std::collections::BTreeSet::new();
        let mut kept = Vec::with_capacity(features.len());

        for (orig_index, borders) in features {
            if !seen.insert(orig_index) {
                return Err(GridError::DuplicateFeature {
                    feature: orig_index,
                });
            }
            if borders.is_empty() {
                continue;
            }
            if borders.iter().any(|b| !b.is_finite()) {
                return Err(GridError::NonFiniteBorder {
                    feature: orig_index,
                });
            }
            if borders.windows(2).any(|w| w[0] >= w[1]) {
                return Err(GridError::UnsortedBorders {
                    feature: orig_index,
                });
            }
            if borders.len() > Self::MAX_BORDERS {
                return Err(GridError::TooManyBorders {
                    feature: orig_index,
                    n_borders: borders.len(),
                    max: Self::MAX_BORDERS,
                });
            }
            kept.push(GridFeature {
                orig_index,
                borders,
            });
        }

        let mut bin_offsets = Vec::with_capacity(kept.len());
        let mut total_bins = 0;
        for feature in &kept {
            bin_offsets.push(total_bins);
            total_bins += feature.borders.len() + 1;
        }

        Ok(Self {
            features: kept,
            bin_offsets,
            total_bins,
        })
    }

    /// Build a grid where `borders[i]` belongs to original feature `i`.
    pub fn from_borders(borders: Vec<Vec<f32>>) -> Result<Self, GridError> {
        Self::new(borders.into_iter().enumerate().collect())
    }

    /// Number of grid (non-zero) features.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Number of split conditions (borders) of local feature `f`.
    #[inline]
    pub fn conditions_count(&self, f: usize) -> usize {
        self.features[f].borders.len()
    }

    /// Start of each feature's bins in the flat bin space.
    #[inline]
    pub fn bin_offsets(&self) -> &[usize] {
        &self.bin_offsets
    }

    /// Size of the flat bin space.
    #[inline]
    pub fn total_bins(&self) -> usize {
        self.total_bins
    }

    #[inline]
    pub fn borders(&self, f: usize) -> &[f32] {
        &self.features[f].borders
    }

    /// Border value of condition `cond` on local feature `f`.
    #[inline]
    pub fn condition(&self, f: usize, cond: usize) -> f32 {
        self.features[f].borders[cond]
    }

    /// Column index of local feature `f` in the raw dataset.
    #[inline]
    pub fn orig_feature_index(&self, f: usize) -> usize {
        self.features[f].orig_index
    }

    /// Flat bin range of local feature `f`.
    #[inline]
    pub fn feature_bins(&self, f: usize) -> Range<usize> {
        let offset = self.bin_offsets[f];
        offset..offset + self.conditions_count(f) + 1
    }

    /// Flat index of the last (cumulative total) bin of feature `f`.
    #[inline]
    pub fn last_bin(&self, f: usize) -> usize {
        self.bin_offsets[f] + self.conditions_count(f)
    }

    /// Local bin of `value` on feature `f`.
    ///
    /// NaN sorts past every border and lands in the last bin.
    #[inline]
    pub fn bin(&self, f: usize, value: f32) -> u16 {
        let borders = &self.features[f].borders;
        let bin = if value.is_nan() {
            borders.len()
        } else {
            borders.partition_point(|&b| b < value)
        };
        bin as u16
    }

    /// One past the largest original feature index referenced by the grid.
    pub fn min_dataset_features(&self) -> usize {
        self.features
            .iter()
            .map(|f| f.orig_index + 1)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_skips_empty_features() {
        let grid = Grid::from_borders(vec![vec![], vec![0.5], vec![1.0, 2.0, 3.0]]).unwrap();

        assert_eq!(grid.n_features(), 2);
        assert_eq!(grid.orig_feature_index(0), 1);
        assert_eq!(grid.orig_feature_index(1), 2);
        assert_eq!(grid.bin_offsets(), &[0, 2]);
        assert_eq!(grid.total_bins(), 6);
        assert_eq!(grid.feature_bins(1), 2..6);
        assert_eq!(grid.last_bin(0), 1);
        assert_eq!(grid.min_dataset_features(), 3);
    }

    #[test]
    fn test_bin_matches_split_predicate() {
        let grid = Grid::from_borders(vec![vec![1.0, 2.0, 3.0]]).unwrap();

        for value in [-5.0f32, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 7.0] {
            let bin = grid.bin(0, value) as usize;
            for cond in 0..grid.conditions_count(0) {
                assert_eq!(
                    bin <= cond,
                    value <= grid.condition(0, cond),
                    "value {value} cond {cond}"
                );
            }
        }
        assert_eq!(grid.bin(0, f32::NAN), 3);
    }

    #[test]
    fn test_rejects_bad_borders() {
        assert_eq!(
            Grid::from_borders(vec![vec![1.0, 1.0]]),
            Err(GridError::UnsortedBorders { feature: 0 })
        );
        assert_eq!(
            Grid::from_borders(vec![vec![0.0], vec![f32::INFINITY]]),
            Err(GridError::NonFiniteBorder { feature: 1 })
        );
        assert_eq!(
            Grid::new(vec![(3, vec![0.0]), (3, vec![1.0])]),
            Err(GridError::DuplicateFeature { feature: 3 })
        );
    }
}
