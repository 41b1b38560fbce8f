//! Best-model checkpointing.
//!
//! A run keeps exactly one checkpoint: the model record at `<dir>/best`
//! (the recorder picks the file extension) plus `<dir>/best.json` holding
//! the [`Checkpoint`] metadata. Each write overwrites both.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tile_core::{ArchId, ChannelSpan, Error, Monitor, Result};
use tile_dataset::ChannelStats;
use tracing::info;

use crate::segmenter::SegmentationModel;

/// Metadata written next to the best model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub preset: String,
    pub arch: ArchId,
    pub stage: usize,
    /// Zero-based epoch inside the stage
    pub stage_epoch: usize,
    /// Zero-based epoch across all stages
    pub global_epoch: usize,
    pub monitor: Monitor,
    pub value: f64,
    pub channel_layout: Vec<ChannelSpan>,
    pub normalization: Option<ChannelStats>,
    pub timestamp: String,
}

impl Checkpoint {
    /// Stamps the metadata with the current time
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        preset: impl Into<String>,
        arch: ArchId,
        stage: usize,
        stage_epoch: usize,
        global_epoch: usize,
        monitor: Monitor,
        value: f64,
        channel_layout: Vec<ChannelSpan>,
        normalization: Option<ChannelStats>,
    ) -> Self {
        Self {
            preset: preset.into(),
            arch,
            stage,
            stage_epoch,
            global_epoch,
            monitor,
            value,
            channel_layout,
            normalization,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize checkpoint: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Serialization(format!("Failed to deserialize checkpoint: {}", e)))
    }
}

/// Destination for improved models.
pub trait CheckpointSink {
    fn write(&mut self, model: &dyn SegmentationModel, checkpoint: &Checkpoint) -> Result<()>;
}

/// Keeps the best checkpoint of a run in one directory
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
}

impl CheckpointManager {
    pub const MODEL_STEM: &'static str = "best";
    pub const METADATA_FILE: &'static str = "best.json";

    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
        }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Model record path without extension
    pub fn model_path(&self) -> PathBuf {
        self.checkpoint_dir.join(Self::MODEL_STEM)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.checkpoint_dir.join(Self::METADATA_FILE)
    }

    /// Metadata of the current best checkpoint, if one exists
    pub fn load_best(&self) -> Result<Option<Checkpoint>> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        Checkpoint::load(&path).map(Some)
    }

    /// Loads the best model into `model` and returns its metadata
    pub fn restore(&self, model: &mut dyn SegmentationModel) -> Result<Checkpoint> {
        let checkpoint = self.load_best()?.ok_or_else(|| {
            Error::Checkpoint(format!(
                "no checkpoint in {}",
                self.checkpoint_dir.display()
            ))
        })?;
        model.load(&self.model_path())?;
        info!(
            "Restored checkpoint from epoch {} ({} = {:.6})",
            checkpoint.global_epoch + 1,
            checkpoint.monitor,
            checkpoint.value
        );
        Ok(checkpoint)
    }
}

impl CheckpointSink for CheckpointManager {
    fn write(&mut self, model: &dyn SegmentationModel, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.checkpoint_dir)?;
        model.save(&self.model_path())?;
        checkpoint.save(&self.metadata_path())?;
        info!(
            "Checkpoint saved to {:?} ({} = {:.6})",
            self.checkpoint_dir, checkpoint.monitor, checkpoint.value
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tile_core::Band;

    fn checkpoint(value: f64) -> Checkpoint {
        Checkpoint::new(
            "unet_ms_staged",
            ArchId::Unet,
            1,
            4,
            14,
            Monitor::ValJaccard,
            value,
            vec![ChannelSpan {
                input: "ms".to_string(),
                band: Band::M,
                offset: 0,
                count: 8,
            }],
            Some(ChannelStats {
                mean: vec![0.5; 8],
                std: vec![0.1; 8],
            }),
        )
    }

    #[test]
    fn test_checkpoint_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("best.json");
        let original = checkpoint(0.61);
        original.save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_manager_paths_and_missing() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        assert_eq!(manager.model_path(), dir.path().join("best"));
        assert_eq!(manager.metadata_path(), dir.path().join("best.json"));
        assert!(manager.load_best().unwrap().is_none());
    }

    #[test]
    fn test_load_best_after_overwrite() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        checkpoint(0.4).save(&manager.metadata_path()).unwrap();
        checkpoint(0.7).save(&manager.metadata_path()).unwrap();

        let best = manager.load_best().unwrap().unwrap();
        assert_eq!(best.value, 0.7);
        assert_eq!(best.normalization.unwrap().std.len(), 8);
    }
}
