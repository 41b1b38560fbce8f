//! Batch sampling over patch indices.

use rand::seq::SliceRandom;
use rand::Rng;
use tile_core::{BatchMode, Error, Result};

/// Infinite stream of index batches over a corpus of `len` patches.
///
/// Each pass walks an index order (shuffled per pass in
/// [`BatchMode::Random`], natural in [`BatchMode::Grid`]) in chunks of
/// `batch_size`; the last chunk of a pass is short rather than padded. An
/// epoch is one pass, or exactly `epoch_batches` chunks when a cap is set,
/// cutting a pass short or running on into the next one. The stream never
/// ends; callers take what they need.
#[derive(Debug, Clone)]
pub struct BatchSampler<R: Rng> {
    batch_size: usize,
    mode: BatchMode,
    epoch_batches: Option<usize>,
    order: Vec<usize>,
    cursor: usize,
    drawn_in_epoch: usize,
    epoch: usize,
    rng: R,
}

impl<R: Rng> BatchSampler<R> {
    pub fn new(
        len: usize,
        batch_size: usize,
        mode: BatchMode,
        epoch_batches: Option<usize>,
        rng: R,
    ) -> Result<Self> {
        if len == 0 {
            return Err(Error::Data("cannot sample from an empty corpus".to_string()));
        }
        if batch_size == 0 {
            return Err(Error::Config("batch size must be positive".to_string()));
        }
        if epoch_batches == Some(0) {
            return Err(Error::Config("epoch_batches must be positive".to_string()));
        }

        let mut sampler = Self {
            batch_size,
            mode,
            epoch_batches,
            order: (0..len).collect(),
            cursor: 0,
            drawn_in_epoch: 0,
            epoch: 0,
            rng,
        };
        sampler.start_pass();
        Ok(sampler)
    }

    fn start_pass(&mut self) {
        self.cursor = 0;
        if self.mode == BatchMode::Random {
            self.order.shuffle(&mut self.rng);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Chunks in one full pass
    pub fn batches_per_pass(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    /// Batches that make up one epoch
    pub fn batches_per_epoch(&self) -> usize {
        self.epoch_batches.unwrap_or_else(|| self.batches_per_pass())
    }

    /// Epochs completed so far
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Batches of the current epoch, then stops
    pub fn epoch_iter(&mut self) -> impl Iterator<Item = Vec<usize>> + '_ {
        let remaining = self.batches_per_epoch() - self.drawn_in_epoch;
        self.take(remaining)
    }
}

impl<R: Rng> Iterator for BatchSampler<R> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.cursor >= self.order.len() {
            self.start_pass();
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        self.drawn_in_epoch += 1;

        if self.drawn_in_epoch == self.batches_per_epoch() {
            self.drawn_in_epoch = 0;
            self.epoch += 1;
            // a capped epoch may stop mid-pass; the next epoch starts fresh
            if self.cursor < self.order.len() {
                self.cursor = self.order.len();
            }
        }
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sampler(len: usize, bs: usize, mode: BatchMode, cap: Option<usize>) -> BatchSampler<ChaCha8Rng> {
        BatchSampler::new(len, bs, mode, cap, ChaCha8Rng::seed_from_u64(2017)).unwrap()
    }

    #[test]
    fn test_grid_order_and_truncated_tail() {
        let mut s = sampler(5, 2, BatchMode::Grid, None);
        assert_eq!(s.batches_per_epoch(), 3);
        let epoch: Vec<_> = s.epoch_iter().collect();
        assert_eq!(epoch, vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(s.epoch(), 1);
        assert_eq!(s.next(), Some(vec![0, 1]));
    }

    #[test]
    fn test_random_pass_visits_each_once() {
        let mut s = sampler(23, 4, BatchMode::Random, None);
        for _ in 0..3 {
            let mut seen: Vec<usize> = s.epoch_iter().flatten().collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..23).collect::<Vec<_>>());
        }
        assert_eq!(s.epoch(), 3);
    }

    #[test]
    fn test_random_reshuffles_each_pass() {
        let mut s = sampler(64, 64, BatchMode::Random, None);
        let first = s.next().unwrap();
        let second = s.next().unwrap();
        assert_ne!(first, second);
        assert_ne!(first, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn test_cap_below_pass_cuts_short() {
        let mut s = sampler(10, 2, BatchMode::Grid, Some(2));
        let epoch: Vec<_> = s.epoch_iter().collect();
        assert_eq!(epoch, vec![vec![0, 1], vec![2, 3]]);
        // next epoch restarts the pass
        assert_eq!(s.next(), Some(vec![0, 1]));
    }

    #[test]
    fn test_cap_above_pass_wraps() {
        let mut s = sampler(3, 2, BatchMode::Grid, Some(4));
        let epoch: Vec<_> = s.epoch_iter().collect();
        assert_eq!(epoch, vec![vec![0, 1], vec![2], vec![0, 1], vec![2]]);
        assert_eq!(s.epoch(), 1);
    }

    #[test]
    fn test_batch_larger_than_corpus() {
        let mut s = sampler(3, 10, BatchMode::Grid, None);
        assert_eq!(s.batches_per_epoch(), 1);
        assert_eq!(s.next(), Some(vec![0, 1, 2]));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let a: Vec<_> = sampler(50, 8, BatchMode::Random, None).take(20).collect();
        let b: Vec<_> = sampler(50, 8, BatchMode::Random, None).take(20).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_arguments() {
        let rng = || ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            BatchSampler::new(0, 2, BatchMode::Grid, None, rng()),
            Err(Error::Data(_))
        ));
        assert!(matches!(
            BatchSampler::new(4, 0, BatchMode::Grid, None, rng()),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            BatchSampler::new(4, 2, BatchMode::Grid, Some(0), rng()),
            Err(Error::Config(_))
        ));
    }
}
