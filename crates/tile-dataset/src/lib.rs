//! Tile data pipeline: stores, patch extraction, augmentation and sampling.
//!
//! A run extracts one [`PatchCorpus`] from a [`TileStore`], optionally
//! normalizes it with [`ChannelStats`], then repeatedly draws index
//! batches from a [`BatchSampler`], gathers them into [`PatchBatch`]
//! copies and augments those in place with an [`Augmenter`].

pub mod augmentation;
pub mod batch;
pub mod extract;
pub mod sampler;
pub mod statistics;
pub mod store;

pub use augmentation::{Augmenter, PatchTransform};
pub use batch::PatchBatch;
pub use extract::{downscale, PatchCorpus, PatchExtractor, PatchOrigin};
pub use sampler::BatchSampler;
pub use statistics::ChannelStats;
pub use store::{MemoryTileStore, RasterHeader, RawTileStore, TileStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::augmentation::*;
    pub use crate::batch::*;
    pub use crate::extract::*;
    pub use crate::sampler::*;
    pub use crate::statistics::*;
    pub use crate::store::*;
}
