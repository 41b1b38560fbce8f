//! Preset schema and validation.
//!
//! A preset arrives as a [`PresetSpec`] (the serde view of the declarative
//! record) and is turned into an immutable [`Preset`] by
//! [`PresetSpec::validate`]. Validation normalizes the two schedule forms
//! (`n_epoch` or an explicit `train` list) into a list of [`Stage`]s and
//! resolves every per-stage override against the preset defaults, so the
//! rest of the pipeline never looks at optional fields again.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{ArchId, Band, BatchMode};
use crate::{Error, Result};

/// Batch size used when neither the preset nor the stage sets one
pub const DEFAULT_BATCH_SIZE: usize = 64;
/// Weight of the Jaccard-complement term when a stage does not set one
pub const DEFAULT_LOSS_JAC_WEIGHT: f64 = 0.2;
/// Probability of each geometric transform firing
pub const DEFAULT_FLIP_PROBABILITY: f64 = 0.5;

/// One model input: a band sliced at an optional downscale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InputSpec {
    /// Input name, e.g. `in_M`
    pub name: String,
    /// Source band
    pub band: Band,
    /// Integer block-mean downscale applied before slicing
    #[serde(default)]
    pub downscale: Option<usize>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, band: Band) -> Self {
        Self {
            name: name.into(),
            band,
            downscale: None,
        }
    }

    pub fn with_downscale(mut self, downscale: usize) -> Self {
        self.downscale = Some(downscale);
        self
    }

    /// Effective downscale factor
    pub fn downscale(&self) -> usize {
        self.downscale.unwrap_or(1)
    }
}

/// Augmentation overrides as written in a preset or stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AugmentSpec {
    #[serde(default)]
    pub mirror: Option<bool>,
    #[serde(default)]
    pub transpose: Option<bool>,
    #[serde(default)]
    pub channel_shift_range: Option<f32>,
    #[serde(default)]
    pub channel_scale_range: Option<f32>,
    #[serde(default)]
    pub flip_probability: Option<f64>,
}

impl AugmentSpec {
    /// Resolves these overrides on top of `base`
    pub fn merge_over(&self, base: &AugmentPolicy) -> AugmentPolicy {
        AugmentPolicy {
            mirror: self.mirror.unwrap_or(base.mirror),
            transpose: self.transpose.unwrap_or(base.transpose),
            channel_shift_range: self.channel_shift_range.or(base.channel_shift_range),
            channel_scale_range: self.channel_scale_range.or(base.channel_scale_range),
            flip_probability: self.flip_probability.unwrap_or(base.flip_probability),
        }
    }
}

/// Fully resolved augmentation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AugmentPolicy {
    /// Enables both mirror transforms
    pub mirror: bool,
    /// Enables the diagonal transpose
    pub transpose: bool,
    /// Half-width of the additive per-channel shift
    pub channel_shift_range: Option<f32>,
    /// Half-width of the multiplicative per-channel scale around 1.0
    pub channel_scale_range: Option<f32>,
    /// Probability of each geometric transform
    pub flip_probability: f64,
}

impl Default for AugmentPolicy {
    fn default() -> Self {
        Self {
            mirror: true,
            transpose: true,
            channel_shift_range: None,
            channel_scale_range: None,
            flip_probability: DEFAULT_FLIP_PROBABILITY,
        }
    }
}

impl AugmentPolicy {
    /// Policy that leaves every batch untouched
    pub fn none() -> Self {
        Self {
            mirror: false,
            transpose: false,
            channel_shift_range: None,
            channel_scale_range: None,
            flip_probability: 0.0,
        }
    }

    fn validate(&self, context: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.flip_probability) {
            return Err(Error::Config(format!(
                "{context}: flip_probability must be in [0, 1], got {}",
                self.flip_probability
            )));
        }
        if let Some(shift) = self.channel_shift_range {
            if !shift.is_finite() || shift < 0.0 {
                return Err(Error::Config(format!(
                    "{context}: channel_shift_range must be a non-negative number, got {shift}"
                )));
            }
        }
        if let Some(scale) = self.channel_scale_range {
            if !scale.is_finite() || !(0.0..1.0).contains(&scale) {
                return Err(Error::Config(format!(
                    "{context}: channel_scale_range must be in [0, 1), got {scale}"
                )));
            }
        }
        Ok(())
    }
}

/// Optimizer kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Adam optimizer
    #[default]
    Adam,
    /// Plain stochastic gradient descent
    Sgd,
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerKind::Adam => write!(f, "adam"),
            OptimizerKind::Sgd => write!(f, "sgd"),
        }
    }
}

/// Optimizer configuration for one stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OptimizerConfig {
    #[serde(default)]
    pub kind: OptimizerKind,
    /// Base learning rate
    #[serde(default = "default_lr")]
    pub lr: f64,
    /// Inverse-time decay per optimizer step
    #[serde(default)]
    pub decay: f64,
}

fn default_lr() -> f64 {
    1e-3
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Adam,
            lr: default_lr(),
            decay: 0.0,
        }
    }
}

impl OptimizerConfig {
    pub fn adam(lr: f64, decay: f64) -> Self {
        Self {
            kind: OptimizerKind::Adam,
            lr,
            decay,
        }
    }

    fn validate(&self, context: &str) -> Result<()> {
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(Error::Config(format!(
                "{context}: learning rate must be positive, got {}",
                self.lr
            )));
        }
        if !self.decay.is_finite() || self.decay < 0.0 {
            return Err(Error::Config(format!(
                "{context}: decay must be non-negative, got {}",
                self.decay
            )));
        }
        Ok(())
    }
}

/// One stage of an explicit schedule, as written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub n_epoch: usize,
    #[serde(default)]
    pub epoch_batches: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub augment: Option<AugmentSpec>,
    #[serde(default)]
    pub optimizer: Option<OptimizerConfig>,
    #[serde(default)]
    pub loss_jac_weight: Option<f64>,
}

/// Declarative preset record, as written in TOML or in the built-in table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PresetSpec {
    pub arch: ArchId,
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub image_patch_size: Option<usize>,
    pub mask_patch_size: usize,
    #[serde(default)]
    pub mask_downscale: Option<usize>,
    #[serde(default)]
    pub batch_mode: BatchMode,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub epoch_batches: Option<usize>,
    #[serde(default)]
    pub classes: Option<Vec<usize>>,
    #[serde(default)]
    pub augment: Option<AugmentSpec>,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default)]
    pub n_epoch: Option<usize>,
    #[serde(default)]
    pub train: Option<Vec<StageSpec>>,
}

impl PresetSpec {
    /// Preset with only the required fields set; the schedule is left empty
    pub fn new(arch: ArchId, inputs: Vec<InputSpec>, mask_patch_size: usize) -> Self {
        Self {
            arch,
            inputs,
            image_patch_size: None,
            mask_patch_size,
            mask_downscale: None,
            batch_mode: BatchMode::Random,
            batch_size: None,
            epoch_batches: None,
            classes: None,
            augment: None,
            normalize: false,
            n_epoch: None,
            train: None,
        }
    }

    /// Checks every field and resolves the schedule into stages.
    pub fn validate(&self, name: &str) -> Result<Preset> {
        let ctx = format!("preset '{name}'");

        if self.inputs.is_empty() {
            return Err(Error::Config(format!("{ctx}: no inputs declared")));
        }
        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(Error::Config(format!(
                    "{ctx}: input '{}' declared twice",
                    input.name
                )));
            }
            if input.downscale == Some(0) {
                return Err(Error::Config(format!(
                    "{ctx}: input '{}' has downscale 0",
                    input.name
                )));
            }
        }

        if self.mask_patch_size == 0 {
            return Err(Error::Config(format!("{ctx}: mask_patch_size must be positive")));
        }
        if self.image_patch_size == Some(0) {
            return Err(Error::Config(format!("{ctx}: image_patch_size must be positive")));
        }
        if self.mask_downscale == Some(0) {
            return Err(Error::Config(format!("{ctx}: mask_downscale must be positive")));
        }
        check_positive(&ctx, "batch_size", self.batch_size)?;
        check_positive(&ctx, "epoch_batches", self.epoch_batches)?;

        if let Some(classes) = &self.classes {
            if classes.is_empty() {
                return Err(Error::Config(format!("{ctx}: class list is empty")));
            }
            let unique: HashSet<_> = classes.iter().collect();
            if unique.len() != classes.len() {
                return Err(Error::Config(format!("{ctx}: class list has duplicates")));
            }
        }

        let augment = self
            .augment
            .as_ref()
            .map(|spec| spec.merge_over(&AugmentPolicy::default()))
            .unwrap_or_default();
        augment.validate(&ctx)?;

        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);

        let stages = match (self.n_epoch, &self.train) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(format!(
                    "{ctx}: set either n_epoch or train, not both"
                )))
            }
            (None, None) => {
                return Err(Error::Config(format!(
                    "{ctx}: no schedule, set n_epoch or train"
                )))
            }
            (Some(n_epoch), None) => {
                if n_epoch == 0 {
                    return Err(Error::Config(format!("{ctx}: n_epoch must be positive")));
                }
                vec![Stage {
                    n_epoch,
                    epoch_batches: self.epoch_batches,
                    batch_size,
                    augment: augment.clone(),
                    optimizer: OptimizerConfig::default(),
                    loss_jac_weight: DEFAULT_LOSS_JAC_WEIGHT,
                }]
            }
            (None, Some(train)) => {
                if train.is_empty() {
                    return Err(Error::Config(format!("{ctx}: train schedule is empty")));
                }
                train
                    .iter()
                    .enumerate()
                    .map(|(index, spec)| {
                        self.resolve_stage(&format!("{ctx} stage {index}"), spec, &augment, batch_size)
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        Ok(Preset {
            name: name.to_string(),
            arch: self.arch,
            inputs: self.inputs.clone(),
            image_patch_size: self.image_patch_size,
            mask_patch_size: self.mask_patch_size,
            mask_downscale: self.mask_downscale.unwrap_or(1),
            batch_mode: self.batch_mode,
            classes: self.classes.clone(),
            augment,
            normalize: self.normalize,
            stages,
        })
    }

    fn resolve_stage(
        &self,
        ctx: &str,
        spec: &StageSpec,
        preset_augment: &AugmentPolicy,
        preset_batch_size: usize,
    ) -> Result<Stage> {
        if spec.n_epoch == 0 {
            return Err(Error::Config(format!("{ctx}: n_epoch must be positive")));
        }
        check_positive(ctx, "batch_size", spec.batch_size)?;
        check_positive(ctx, "epoch_batches", spec.epoch_batches)?;

        let augment = spec
            .augment
            .as_ref()
            .map(|a| a.merge_over(preset_augment))
            .unwrap_or_else(|| preset_augment.clone());
        augment.validate(ctx)?;

        let optimizer = spec.optimizer.unwrap_or_default();
        optimizer.validate(ctx)?;

        let loss_jac_weight = spec.loss_jac_weight.unwrap_or(DEFAULT_LOSS_JAC_WEIGHT);
        if !loss_jac_weight.is_finite() || loss_jac_weight < 0.0 {
            return Err(Error::Config(format!(
                "{ctx}: loss_jac_weight must be non-negative, got {loss_jac_weight}"
            )));
        }

        Ok(Stage {
            n_epoch: spec.n_epoch,
            epoch_batches: spec.epoch_batches.or(self.epoch_batches),
            batch_size: spec.batch_size.unwrap_or(preset_batch_size),
            augment,
            optimizer,
            loss_jac_weight,
        })
    }
}

fn check_positive(ctx: &str, field: &str, value: Option<usize>) -> Result<()> {
    if value == Some(0) {
        return Err(Error::Config(format!("{ctx}: {field} must be positive")));
    }
    Ok(())
}

/// One resolved phase of the training schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub n_epoch: usize,
    /// Batches per epoch; `None` means one pass over the corpus
    pub epoch_batches: Option<usize>,
    pub batch_size: usize,
    /// Stage override already merged over the preset default
    pub augment: AugmentPolicy,
    pub optimizer: OptimizerConfig,
    pub loss_jac_weight: f64,
}

/// Validated, immutable training configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preset {
    pub name: String,
    pub arch: ArchId,
    /// Inputs in concatenation order
    pub inputs: Vec<InputSpec>,
    pub image_patch_size: Option<usize>,
    pub mask_patch_size: usize,
    pub mask_downscale: usize,
    pub batch_mode: BatchMode,
    /// Class subset in output order; `None` keeps every label channel
    pub classes: Option<Vec<usize>>,
    /// Preset-level augmentation policy
    pub augment: AugmentPolicy,
    pub normalize: bool,
    pub stages: Vec<Stage>,
}

impl Preset {
    /// Sum of the stage epoch counts
    pub fn total_epochs(&self) -> usize {
        self.stages.iter().map(|s| s.n_epoch).sum()
    }

    /// Resolves the stage and in-stage epoch for a zero-based global epoch
    pub fn locate_epoch(&self, global_epoch: usize) -> Option<(usize, usize)> {
        let mut start = 0;
        for (index, stage) in self.stages.iter().enumerate() {
            if global_epoch < start + stage.n_epoch {
                return Some((index, global_epoch - start));
            }
            start += stage.n_epoch;
        }
        None
    }
}

/// Metric watched by the checkpoint logic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    /// Mean training loss of the epoch
    #[default]
    Loss,
    /// Mean training soft Jaccard of the epoch
    Jaccard,
    /// Loss on the validation holdout
    ValLoss,
    /// Soft Jaccard on the validation holdout
    ValJaccard,
}

impl Monitor {
    /// Whether larger values are better
    pub fn maximize(&self) -> bool {
        matches!(self, Monitor::Jaccard | Monitor::ValJaccard)
    }

    /// Whether the metric needs a validation holdout
    pub fn needs_validation(&self) -> bool {
        matches!(self, Monitor::ValLoss | Monitor::ValJaccard)
    }

    /// Strict improvement check; ties are not improvements
    pub fn improves(&self, candidate: f64, best: Option<f64>) -> bool {
        match best {
            None => candidate.is_finite(),
            Some(best) if self.maximize() => candidate > best,
            Some(best) => candidate < best,
        }
    }
}

impl std::fmt::Display for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Monitor::Loss => write!(f, "loss"),
            Monitor::Jaccard => write!(f, "jaccard"),
            Monitor::ValLoss => write!(f, "val_loss"),
            Monitor::ValJaccard => write!(f, "val_jaccard"),
        }
    }
}

impl std::str::FromStr for Monitor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "loss" => Ok(Monitor::Loss),
            "jaccard" => Ok(Monitor::Jaccard),
            "val_loss" => Ok(Monitor::ValLoss),
            "val_jaccard" => Ok(Monitor::ValJaccard),
            other => Err(Error::Config(format!("unknown monitor '{other}'"))),
        }
    }
}

/// Run-level settings that are not part of a preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seed for the run's random source
    pub seed: u64,
    pub monitor: Monitor,
    /// Fraction of patches held out for validation
    pub val_split: Option<f64>,
    /// Directory receiving checkpoints and history
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            monitor: Monitor::Loss,
            val_split: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(split) = self.val_split {
            if !(split > 0.0 && split < 1.0) {
                return Err(Error::Config(format!(
                    "val_split must be in (0, 1), got {split}"
                )));
            }
        }
        if self.monitor.needs_validation() && self.val_split.is_none() {
            return Err(Error::Config(format!(
                "monitor '{}' needs a validation split",
                self.monitor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> PresetSpec {
        let mut spec = PresetSpec::new(
            ArchId::Unet,
            vec![
                InputSpec::new("in_I", Band::I).with_downscale(4),
                InputSpec::new("in_M", Band::M),
            ],
            128,
        );
        spec.mask_downscale = Some(4);
        spec.batch_size = Some(32);
        spec.n_epoch = Some(10);
        spec
    }

    #[test]
    fn test_flat_schedule_becomes_single_stage() {
        let preset = base_spec().validate("flat").unwrap();
        assert_eq!(preset.stages.len(), 1);
        let stage = &preset.stages[0];
        assert_eq!(stage.n_epoch, 10);
        assert_eq!(stage.batch_size, 32);
        assert_eq!(stage.loss_jac_weight, DEFAULT_LOSS_JAC_WEIGHT);
        assert_eq!(stage.optimizer, OptimizerConfig::default());
        assert_eq!(preset.mask_downscale, 4);
        assert_eq!(preset.total_epochs(), 10);
    }

    #[test]
    fn test_explicit_stages_inherit_and_override() {
        let mut spec = base_spec();
        spec.n_epoch = None;
        spec.epoch_batches = Some(100);
        spec.augment = Some(AugmentSpec {
            channel_shift_range: Some(0.01),
            ..Default::default()
        });
        spec.train = Some(vec![
            StageSpec {
                n_epoch: 2,
                epoch_batches: None,
                batch_size: Some(16),
                augment: Some(AugmentSpec {
                    mirror: Some(false),
                    ..Default::default()
                }),
                optimizer: Some(OptimizerConfig::adam(1e-1, 2e-4)),
                loss_jac_weight: Some(0.05),
            },
            StageSpec {
                n_epoch: 3,
                epoch_batches: Some(50),
                batch_size: None,
                augment: None,
                optimizer: None,
                loss_jac_weight: None,
            },
        ]);

        let preset = spec.validate("staged").unwrap();
        assert_eq!(preset.total_epochs(), 5);

        let first = &preset.stages[0];
        assert_eq!(first.batch_size, 16);
        assert_eq!(first.epoch_batches, Some(100));
        assert!(!first.augment.mirror);
        assert!(first.augment.transpose);
        assert_eq!(first.augment.channel_shift_range, Some(0.01));
        assert_eq!(first.optimizer.lr, 1e-1);
        assert_eq!(first.loss_jac_weight, 0.05);

        let second = &preset.stages[1];
        assert_eq!(second.batch_size, 32);
        assert_eq!(second.epoch_batches, Some(50));
        assert!(second.augment.mirror);
        assert_eq!(second.augment.channel_shift_range, Some(0.01));
    }

    #[test]
    fn test_locate_epoch_across_stages() {
        let mut spec = base_spec();
        spec.n_epoch = None;
        spec.train = Some(vec![
            StageSpec {
                n_epoch: 2,
                epoch_batches: None,
                batch_size: None,
                augment: None,
                optimizer: None,
                loss_jac_weight: None,
            },
            StageSpec {
                n_epoch: 3,
                epoch_batches: None,
                batch_size: None,
                augment: None,
                optimizer: None,
                loss_jac_weight: None,
            },
        ]);
        let preset = spec.validate("p").unwrap();
        assert_eq!(preset.locate_epoch(0), Some((0, 0)));
        assert_eq!(preset.locate_epoch(1), Some((0, 1)));
        assert_eq!(preset.locate_epoch(2), Some((1, 0)));
        assert_eq!(preset.locate_epoch(4), Some((1, 2)));
        assert_eq!(preset.locate_epoch(5), None);
    }

    #[test]
    fn test_schedule_must_be_exactly_one_form() {
        let mut spec = base_spec();
        spec.n_epoch = None;
        assert!(matches!(spec.validate("p"), Err(Error::Config(_))));

        let mut spec = base_spec();
        spec.train = Some(vec![]);
        assert!(matches!(spec.validate("p"), Err(Error::Config(_))));
    }

    #[test]
    fn test_class_list_checks() {
        let mut spec = base_spec();
        spec.classes = Some(vec![]);
        assert!(matches!(spec.validate("p"), Err(Error::Config(_))));

        spec.classes = Some(vec![1, 1]);
        assert!(matches!(spec.validate("p"), Err(Error::Config(_))));

        spec.classes = Some(vec![4, 5, 6, 7]);
        assert!(spec.validate("p").is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut spec = base_spec();
        spec.mask_patch_size = 0;
        assert!(spec.validate("p").is_err());

        let mut spec = base_spec();
        spec.batch_size = Some(0);
        assert!(spec.validate("p").is_err());

        let mut spec = base_spec();
        spec.inputs[0].downscale = Some(0);
        assert!(spec.validate("p").is_err());
    }

    #[test]
    fn test_duplicate_input_names_rejected() {
        let mut spec = base_spec();
        spec.inputs.push(InputSpec::new("in_M", Band::MI));
        assert!(matches!(spec.validate("p"), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_augment_rejected() {
        let mut spec = base_spec();
        spec.augment = Some(AugmentSpec {
            channel_scale_range: Some(1.5),
            ..Default::default()
        });
        assert!(matches!(spec.validate("p"), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_band_in_toml_is_config_error() {
        let text = r#"
            arch = "fcn"
            mask_patch_size = 64
            n_epoch = 1
            inputs = [{ name = "in", band = "Q" }]
        "#;
        let parsed: std::result::Result<PresetSpec, _> = toml::from_str(text);
        let err: Error = parsed.unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_monitor_improvement_is_strict() {
        assert!(Monitor::Loss.improves(0.5, None));
        assert!(Monitor::Loss.improves(0.4, Some(0.5)));
        assert!(!Monitor::Loss.improves(0.5, Some(0.5)));
        assert!(Monitor::ValJaccard.improves(0.6, Some(0.5)));
        assert!(!Monitor::ValJaccard.improves(0.5, Some(0.5)));
        assert!(!Monitor::Loss.improves(f64::NAN, None));
    }

    #[test]
    fn test_run_config_validation() {
        assert!(RunConfig::default().validate().is_ok());

        let config = RunConfig {
            monitor: Monitor::ValLoss,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = RunConfig {
            monitor: Monitor::ValLoss,
            val_split: Some(0.3),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = RunConfig {
            val_split: Some(1.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
