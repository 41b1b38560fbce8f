//! Per-channel image statistics and standardization.

use serde::{Deserialize, Serialize};
use tile_core::{Error, Result};
use tracing::{debug, warn};

use crate::extract::PatchCorpus;

/// Mean and standard deviation of every image channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl ChannelStats {
    /// Population statistics over every patch of `corpus`
    pub fn compute(corpus: &PatchCorpus) -> Self {
        let [channels, h, w] = corpus.image_shape();
        let plane = h * w;
        let mut sum = vec![0.0f64; channels];
        let mut sum_sq = vec![0.0f64; channels];

        if plane > 0 {
            for (i, chunk) in corpus.images().chunks_exact(plane).enumerate() {
                let c = i % channels;
                for &v in chunk {
                    let v = v as f64;
                    sum[c] += v;
                    sum_sq[c] += v * v;
                }
            }
        }

        let count = (corpus.len() * plane).max(1) as f64;
        let mean: Vec<f64> = sum.iter().map(|s| s / count).collect();
        let std = sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| ((sq / count - m * m).max(0.0)).sqrt() as f32)
            .collect();
        let stats = Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            std,
        };
        debug!("Channel statistics: mean {:?}, std {:?}", stats.mean, stats.std);
        stats
    }

    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Standardizes `corpus` in place; zero-variance channels are only centred
    pub fn apply(&self, corpus: &mut PatchCorpus) -> Result<()> {
        let [channels, h, w] = corpus.image_shape();
        if channels != self.channels() {
            return Err(Error::Data(format!(
                "statistics cover {} channels, corpus has {channels}",
                self.channels()
            )));
        }
        for (c, s) in self.std.iter().enumerate() {
            if *s == 0.0 {
                warn!("Channel {c} has zero variance; centring only");
            }
        }

        let plane = h * w;
        if plane == 0 {
            return Ok(());
        }
        for (i, chunk) in corpus.images_mut().chunks_exact_mut(plane).enumerate() {
            let c = i % channels;
            let (mean, std) = (self.mean[c], self.std[c]);
            for v in chunk.iter_mut() {
                *v -= mean;
                if std > 0.0 {
                    *v /= std;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryTileStore, PatchExtractor};
    use tile_core::{ArchId, Band, InputSpec, PresetSpec, Raster};

    fn corpus() -> PatchCorpus {
        // channel 0 alternates 1/3 by column, channel 1 is constant 5
        let band = Raster::from_fn(2, 8, 8, |c, _, x| if c == 0 { 1.0 + 2.0 * (x % 2) as f32 } else { 5.0 });
        let store = MemoryTileStore::new()
            .with_band("t", Band::M, band)
            .with_mask("t", Raster::zeros(1, 8, 8));
        let mut spec = PresetSpec::new(ArchId::Fcn, vec![InputSpec::new("m", Band::M)], 4);
        spec.n_epoch = Some(1);
        let preset = spec.validate("stats").unwrap();
        PatchExtractor::new(&preset)
            .extract(&store, &["t".to_string()])
            .unwrap()
    }

    #[test]
    fn test_compute() {
        let stats = ChannelStats::compute(&corpus());
        assert_eq!(stats.channels(), 2);
        assert!((stats.mean[0] - 2.0).abs() < 1e-6);
        assert!((stats.std[0] - 1.0).abs() < 1e-6);
        assert!((stats.mean[1] - 5.0).abs() < 1e-6);
        assert_eq!(stats.std[1], 0.0);
    }

    #[test]
    fn test_apply_standardizes_and_centres() {
        let mut corpus = corpus();
        let stats = ChannelStats::compute(&corpus);
        stats.apply(&mut corpus).unwrap();

        let after = ChannelStats::compute(&corpus);
        assert!(after.mean[0].abs() < 1e-6);
        assert!((after.std[0] - 1.0).abs() < 1e-6);
        // constant channel only centred
        assert!(corpus.image(0)[16..32].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_apply_channel_mismatch() {
        let mut corpus = corpus();
        let stats = ChannelStats {
            mean: vec![0.0],
            std: vec![1.0],
        };
        assert!(matches!(stats.apply(&mut corpus), Err(Error::Data(_))));
    }
}
