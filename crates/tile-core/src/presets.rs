//! Built-in preset table and the registry that resolves preset names.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cli::load_toml_config;
use crate::config::{AugmentSpec, InputSpec, OptimizerConfig, Preset, PresetSpec, StageSpec};
use crate::types::{ArchId, Band, BatchMode};
use crate::{Error, Result};

/// On-disk layout of a preset file: `[presets.<name>]` tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresetFile {
    #[serde(default)]
    pub presets: BTreeMap<String, PresetSpec>,
}

/// Named preset specs, validated on lookup.
#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    specs: BTreeMap<String, PresetSpec>,
}

impl PresetRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the compiled-in presets
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, spec) in builtin_presets() {
            registry.insert(name, spec);
        }
        registry
    }

    /// Adds or replaces a preset
    pub fn insert(&mut self, name: impl Into<String>, spec: PresetSpec) {
        self.specs.insert(name.into(), spec);
    }

    /// Merges presets from a TOML file; same-named entries replace existing ones.
    ///
    /// Every merged preset is validated immediately so a broken file fails
    /// before any tile is read.
    pub fn merge_file(&mut self, path: &Path) -> Result<usize> {
        let file: PresetFile = load_toml_config(path)?;
        for (name, spec) in &file.presets {
            spec.validate(name)?;
        }
        let count = file.presets.len();
        for (name, spec) in file.presets {
            debug!("Registered preset '{}' from {}", name, path.display());
            self.specs.insert(name, spec);
        }
        info!("Loaded {} presets from {}", count, path.display());
        Ok(count)
    }

    /// Looks up and validates a preset
    pub fn get(&self, name: &str) -> Result<Preset> {
        let spec = self.specs.get(name).ok_or_else(|| {
            Error::Config(format!(
                "unknown preset '{name}', available: {}",
                self.names().join(", ")
            ))
        })?;
        spec.validate(name)
    }

    /// Raw spec for a preset name
    pub fn spec(&self, name: &str) -> Option<&PresetSpec> {
        self.specs.get(name)
    }

    /// Sorted preset names
    pub fn names(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn ms_inputs() -> Vec<InputSpec> {
    vec![
        InputSpec::new("in_I", Band::I).with_downscale(4),
        InputSpec::new("in_IF", Band::IF).with_downscale(4),
        InputSpec::new("in_M", Band::M),
        InputSpec::new("in_MI", Band::MI),
    ]
}

fn no_flip() -> AugmentSpec {
    AugmentSpec {
        mirror: Some(false),
        transpose: Some(false),
        ..Default::default()
    }
}

fn jitter(range: f32) -> AugmentSpec {
    AugmentSpec {
        channel_shift_range: Some(range),
        channel_scale_range: Some(range),
        ..Default::default()
    }
}

fn stage(
    n_epoch: usize,
    batch_size: usize,
    optimizer: OptimizerConfig,
    loss_jac_weight: Option<f64>,
) -> StageSpec {
    StageSpec {
        n_epoch,
        epoch_batches: Some(100),
        batch_size: Some(batch_size),
        augment: None,
        optimizer: Some(optimizer),
        loss_jac_weight,
    }
}

/// The compiled-in preset table.
pub fn builtin_presets() -> Vec<(&'static str, PresetSpec)> {
    let mut presets = Vec::new();

    // Visible bands only, full resolution.
    let mut spec = PresetSpec::new(ArchId::Unet, vec![InputSpec::new("in", Band::I)], 64);
    spec.n_epoch = Some(100);
    presets.push(("unet_i", spec));

    // Multispectral at a quarter of the label resolution.
    let mut spec = PresetSpec::new(ArchId::Unet, vec![InputSpec::new("in", Band::M)], 80);
    spec.mask_downscale = Some(4);
    spec.batch_size = Some(32);
    spec.epoch_batches = Some(400);
    spec.n_epoch = Some(100);
    presets.push(("unet_m", spec));

    // Deterministic pass order, useful for reproducible comparisons.
    let mut spec = PresetSpec::new(ArchId::Fcn, vec![InputSpec::new("in", Band::M)], 112);
    spec.mask_downscale = Some(4);
    spec.batch_mode = BatchMode::Grid;
    spec.batch_size = Some(32);
    spec.n_epoch = Some(100);
    presets.push(("fcn_m_grid", spec));

    let mut spec = PresetSpec::new(ArchId::Unet, ms_inputs(), 128);
    spec.mask_downscale = Some(4);
    spec.batch_size = Some(48);
    spec.n_epoch = Some(70);
    spec.classes = Some(vec![4, 5, 6, 7]);
    presets.push(("unet_ms_areas", spec));

    let mut spec = PresetSpec::new(ArchId::Unet, ms_inputs(), 128);
    spec.mask_downscale = Some(4);
    spec.batch_size = Some(32);
    spec.n_epoch = Some(100);
    spec.augment = Some(jitter(1e-4));
    spec.classes = Some(vec![6, 7]);
    presets.push(("unet_ms_water", spec));

    let mut spec = PresetSpec::new(
        ArchId::Unet,
        vec![
            InputSpec::new("in_I", Band::I),
            InputSpec::new("in_IF", Band::IF),
        ],
        128,
    );
    spec.batch_size = Some(32);
    spec.epoch_batches = Some(100);
    spec.n_epoch = Some(100);
    spec.augment = Some(jitter(0.01));
    spec.classes = Some(vec![0, 1, 2, 3]);
    spec.normalize = true;
    presets.push(("unet_i_structs", spec));

    let mut spec = PresetSpec::new(ArchId::Fcn, vec![InputSpec::new("in", Band::I)], 48);
    spec.batch_size = Some(48);
    spec.epoch_batches = Some(600);
    spec.n_epoch = Some(50);
    spec.augment = Some(no_flip());
    spec.classes = Some(vec![8, 9]);
    presets.push(("fcn_i_cars", spec));

    // Three-stage warm start: high learning rate first, then settle.
    let mut spec = PresetSpec::new(ArchId::Unet, ms_inputs(), 128);
    spec.mask_downscale = Some(4);
    spec.classes = Some(vec![2, 3, 4, 5, 6, 7]);
    spec.train = Some(vec![
        stage(10, 16, OptimizerConfig::adam(1e-1, 2e-4), Some(0.05)),
        stage(100, 32, OptimizerConfig::adam(1e-2, 2e-4), Some(0.15)),
        stage(300, 32, OptimizerConfig::adam(1e-4, 2e-4), Some(0.3)),
    ]);
    presets.push(("unet_ms_staged", spec));

    let mut spec = PresetSpec::new(ArchId::Unet, ms_inputs(), 128);
    spec.mask_downscale = Some(4);
    spec.classes = Some(vec![0, 1, 2, 3, 4, 5, 6, 7]);
    let mut only = stage(300, 32, OptimizerConfig::adam(1e-4, 2e-4), None);
    only.augment = Some(no_flip());
    spec.train = Some(vec![only]);
    presets.push(("unet_ms_all", spec));

    presets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_presets_all_validate() {
        let registry = PresetRegistry::builtin();
        assert!(!registry.is_empty());
        for name in registry.names() {
            let preset = registry.get(&name).unwrap();
            assert_eq!(preset.name, name);
            assert!(preset.total_epochs() > 0);
        }
    }

    #[test]
    fn test_staged_builtin() {
        let preset = PresetRegistry::builtin().get("unet_ms_staged").unwrap();
        assert_eq!(preset.stages.len(), 3);
        assert_eq!(preset.total_epochs(), 410);
        assert_eq!(preset.stages[0].batch_size, 16);
        assert_eq!(preset.stages[2].loss_jac_weight, 0.3);
        assert_eq!(preset.inputs.len(), 4);
        assert_eq!(preset.inputs[0].downscale(), 4);
    }

    #[test]
    fn test_unknown_preset_is_config_error() {
        let err = PresetRegistry::builtin().get("nope").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_merge_file_overrides_and_adds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("presets.toml");
        fs::write(
            &path,
            r#"
[presets.unet_i]
arch = "fcn"
mask_patch_size = 32
n_epoch = 3
inputs = [{ name = "in", band = "P" }]

[presets.custom_staged]
arch = "unet"
mask_patch_size = 64
mask_downscale = 2
batch_mode = "grid"
classes = [0, 3]
inputs = [
    { name = "in_M", band = "M" },
    { name = "in_A", band = "A", downscale = 2 },
]

[[presets.custom_staged.train]]
n_epoch = 2
batch_size = 8
optimizer = { kind = "adam", lr = 0.01, decay = 0.0002 }
augment = { mirror = false }

[[presets.custom_staged.train]]
n_epoch = 3
loss_jac_weight = 0.3
optimizer = { kind = "sgd", lr = 0.001 }
"#,
        )
        .unwrap();

        let mut registry = PresetRegistry::builtin();
        let before = registry.len();
        assert_eq!(registry.merge_file(&path).unwrap(), 2);
        assert_eq!(registry.len(), before + 1);

        let replaced = registry.get("unet_i").unwrap();
        assert_eq!(replaced.arch, ArchId::Fcn);
        assert_eq!(replaced.inputs[0].band, Band::P);

        let custom = registry.get("custom_staged").unwrap();
        assert_eq!(custom.batch_mode, BatchMode::Grid);
        assert_eq!(custom.total_epochs(), 5);
        assert!(!custom.stages[0].augment.mirror);
        assert_eq!(custom.stages[1].optimizer.kind, crate::OptimizerKind::Sgd);
        assert_eq!(custom.stages[1].loss_jac_weight, 0.3);
    }

    #[test]
    fn test_merge_file_rejects_invalid_preset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(
            &path,
            r#"
[presets.broken]
arch = "unet"
mask_patch_size = 64
classes = []
n_epoch = 1
inputs = [{ name = "in", band = "M" }]
"#,
        )
        .unwrap();

        let mut registry = PresetRegistry::new();
        assert!(matches!(registry.merge_file(&path), Err(Error::Config(_))));
        assert!(registry.is_empty());
    }
}
