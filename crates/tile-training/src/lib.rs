//! Training infrastructure for tile segmentation.
//!
//! This crate provides:
//! - Soft and thresholded Jaccard metrics and the combined loss
//! - Segmentation networks (FCN, U-Net) behind an architecture factory
//! - Per-step learning rate decay
//! - Best-model checkpointing with resumable metadata
//! - The staged training loop

pub mod checkpoint;
pub mod loss;
pub mod lr_schedule;
pub mod model;
pub mod segmenter;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointSink};
pub use lr_schedule::{LearningRateScheduler, SchedulerType};
pub use model::{ModelSpec, SegmentationNet};
pub use segmenter::{ArchitectureFactory, BurnFactory, BurnSegmenter, SegmentationModel};
pub use trainer::{evaluate_corpus, ResumePoint, Trainer, TrainingPhase, TrainingState};

use tile_core::Preset;
use tile_dataset::PatchCorpus;

/// Model shapes implied by an extracted corpus
pub fn model_spec_for(corpus: &PatchCorpus) -> ModelSpec {
    let [in_channels, image_patch_size, _] = corpus.image_shape();
    let [n_classes, mask_patch_size, _] = corpus.mask_shape();
    ModelSpec {
        in_channels,
        image_patch_size,
        n_classes,
        mask_patch_size,
    }
}

/// Builds the preset's architecture for `corpus`
pub fn build_model(
    factory: &dyn ArchitectureFactory,
    preset: &Preset,
    corpus: &PatchCorpus,
) -> tile_core::Result<Box<dyn SegmentationModel>> {
    factory.build(preset.arch, &model_spec_for(corpus))
}

/// Re-export commonly used types
pub mod prelude {
    pub use super::checkpoint::{Checkpoint, CheckpointManager, CheckpointSink};
    pub use super::loss::*;
    pub use super::segmenter::{ArchitectureFactory, BurnFactory, SegmentationModel};
    pub use super::trainer::{ResumePoint, Trainer, TrainingPhase};
}
