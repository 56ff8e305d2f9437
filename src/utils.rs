//! Common utilities used across the crate.
//!
//! Parallelism configuration, thread pool setup and sample blocking for the
//! data-parallel phases of tree training.

use std::ops::Range;

use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// This is a simple flag passed through training components. When `Parallel`,
/// components may use `rayon` parallel iterators; when `Sequential` they must
/// iterate on the calling thread.
///
/// The actual thread pool is set up once per training run via [`run_with_threads`].
/// Components don't manage thread pools, they just respect this flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Number of sample blocks a data-parallel pass should be cut into.
    ///
    /// One block per worker, so each block owns one set of partial buffers.
    #[inline]
    pub fn n_blocks(self) -> usize {
        if self.is_parallel() {
            rayon::current_num_threads().max(1)
        } else {
            1
        }
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }

    /// Indexed mutable for_each over a slice.
    ///
    /// Each element is visited by exactly one worker, so `f` may mutate it freely.
    #[inline]
    pub fn maybe_par_for_each_mut<T, F>(self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        if self.is_parallel() {
            items.par_iter_mut().enumerate().for_each(|(i, item)| f(i, item));
        } else {
            items.iter_mut().enumerate().for_each(|(i, item)| f(i, item));
        }
    }

    /// Fallible variant of [`maybe_par_for_each_mut`](Self::maybe_par_for_each_mut).
    ///
    /// Returns the first error encountered. In parallel mode which error is "first"
    /// is unspecified.
    #[inline]
    pub fn maybe_par_try_for_each_mut<T, E, F>(self, items: &mut [T], f: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(&mut T) -> Result<(), E> + Sync + Send,
    {
        if self.is_parallel() {
            items.par_iter_mut().try_for_each(f)
        } else {
            items.iter_mut().try_for_each(f)
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use rayon's global pool)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// # Example
///
/// ```
/// use linear_oblivious_tree::run_with_threads;
///
/// let answer = run_with_threads(1, |_| 42).unwrap();
/// assert_eq!(answer, 42);
/// ```
pub fn run_with_threads<T: Send>(
    n_threads: usize,
    f: impl FnOnce(Parallelism) -> T + Send,
) -> Result<T, rayon::ThreadPoolBuildError> {
    let parallelism = Parallelism::from_threads(n_threads);

    match (parallelism, n_threads) {
        (Parallelism::Sequential, _) => Ok(f(Parallelism::Sequential)),
        (Parallelism::Parallel, 0) => Ok(f(Parallelism::Parallel)),
        (Parallelism::Parallel, n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            Ok(pool.install(|| f(Parallelism::Parallel)))
        }
    }
}

// =============================================================================
// Sample Blocking
// =============================================================================

/// Cut `0..n_samples` into at most `n_blocks` contiguous, non-empty ranges.
///
/// Returns a single empty range when `n_samples == 0` so reductions still have
/// one (zeroed) partial to work with.
pub fn sample_blocks(n_samples: usize, n_blocks: usize) -> Vec<Range<usize>> {
    let n_blocks = n_blocks.clamp(1, n_samples.max(1));
    let block_len = n_samples.div_ceil(n_blocks).max(1);

    let mut blocks: Vec<Range<usize>> = (0..n_samples)
        .step_by(block_len)
        .map(|start| start..(start + block_len).min(n_samples))
        .collect();
    if blocks.is_empty() {
        blocks.push(0..0);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_from_threads() {
        assert!(!Parallelism::from_threads(1).is_parallel());
        assert!(Parallelism::from_threads(2).is_parallel());
        assert!(Parallelism::from_threads(8).is_parallel());
    }

    #[test]
    fn test_run_with_threads_sequential() {
        let result = run_with_threads(1, |p| (p, 42)).unwrap();
        assert_eq!(result, (Parallelism::Sequential, 42));
    }

    #[test]
    fn test_run_with_threads_explicit() {
        let result = run_with_threads(2, |_| rayon::current_num_threads()).unwrap();
        assert_eq!(result, 2);
    }

    #[test]
    fn test_sample_blocks_cover_range() {
        let blocks = sample_blocks(10, 3);
        assert_eq!(blocks, vec![0..4, 4..8, 8..10]);

        let blocks = sample_blocks(2, 8);
        assert_eq!(blocks, vec![0..1, 1..2]);
    }

    #[test]
    fn test_sample_blocks_empty() {
        assert_eq!(sample_blocks(0, 4), vec![0..0]);
    }

    #[test]
    fn test_maybe_par_for_each_mut() {
        let mut data = vec![0usize; 16];
        Parallelism::Parallel.maybe_par_for_each_mut(&mut data, |i, v| *v = i * 2);
        assert_eq!(data[7], 14);

        Parallelism::Sequential.maybe_par_for_each_mut(&mut data, |i, v| *v += i);
        assert_eq!(data[7], 21);
    }

    #[test]
    fn test_maybe_par_try_for_each_mut_propagates() {
        let mut data = vec![1, 2, 3];
        let res: Result<(), String> = Parallelism::Sequential
            .maybe_par_try_for_each_mut(&mut data, |v| if *v == 2 { Err("two".into()) } else { Ok(()) });
        assert_eq!(res, Err("two".to_string()));
    }

    #[test]
    fn test_maybe_par_map() {
        let result: Vec<_> = Parallelism::Parallel.maybe_par_map(0..5usize, |i| i * 2);
        assert_eq!(result, vec![0, 2, 4, 6, 8]);
    }
}
