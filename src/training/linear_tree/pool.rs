//! Recycled histogram storage.

use std::sync::Arc;

use super::histogram::Histogram;
use crate::data::Grid;

/// Free list of histograms shared by the levels of one training run.
///
/// Children of level `g + 1` are acquired while the parents of level `g` are
/// still alive; parents go back to the pool once their children are complete.
/// At most two levels of histograms exist at any time.
#[derive(Debug)]
pub struct HistogramPool {
    grid: Arc<Grid>,
    capacity: usize,
    free: Vec<Histogram>,
    generation: u32,
    allocated: usize,
}

impl HistogramPool {
    pub fn new(grid: Arc<Grid>, capacity: usize) -> Self {
        Self {
            grid,
            capacity,
            free: Vec::new(),
            generation: 0,
            allocated: 0,
        }
    }

    /// Current generation; histograms acquired now carry it.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Total histograms ever allocated by this pool.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// A zeroed histogram with the given used-feature layout.
    pub fn acquire(&mut self, filled: usize, last_used_feature: Option<usize>) -> Histogram {
        match self.free.pop() {
            Some(mut hist) => {
                hist.reset(filled, last_used_feature, self.generation);
                hist
            }
            None => {
                self.allocated += 1;
                let mut hist =
                    Histogram::new(Arc::clone(&self.grid), self.capacity, filled, last_used_feature);
                hist.reset(filled, last_used_feature, self.generation);
                hist
            }
        }
    }

    /// Return histograms to the free list.
    pub fn release(&mut self, hists: impl IntoIterator<Item = Histogram>) {
        self.free.extend(hists);
    }

    /// Move on to the next level.
    #[inline]
    pub fn advance(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}
