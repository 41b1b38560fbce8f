//! Training CLI Tool
//!
//! Trains a segmentation network on raw tiles according to a named preset:
//! extracts the patch corpus, optionally holds out a validation split and
//! standardizes channels, then runs the preset's stages and keeps the best
//! checkpoint plus the run history in the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tile_core::{setup_cli_logging, Monitor, Preset, PresetRegistry, RunConfig, TrainingHistory};
use tile_dataset::{ChannelStats, PatchCorpus, PatchExtractor, RawTileStore};
use tile_training::{build_model, BurnFactory, CheckpointManager, ResumePoint, Trainer};
use tracing::{info, warn};

type TrainBackend = Autodiff<NdArray>;

const HISTORY_FILE: &str = "history.json";

/// Tile Segmentation Training Tool
#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train tile segmentation models from presets",
    long_about = "Train tile segmentation models. Presets select the architecture, input bands, \
                  patch geometry and the staged training schedule."
)]
struct Args {
    /// Preset to train
    #[arg(short, long, value_name = "NAME", required_unless_present = "list_presets")]
    preset: Option<String>,

    /// Extra presets (TOML), merged over the built-in ones
    #[arg(long, value_name = "FILE")]
    presets: Option<PathBuf>,

    /// Tile store root directory
    #[arg(short, long, value_name = "DIR", default_value = "data")]
    data: PathBuf,

    /// Image ids to train on
    #[arg(short, long, value_name = "ID", num_args = 1.., conflicts_with = "image_list")]
    images: Vec<String>,

    /// File with one image id per line
    #[arg(long, value_name = "FILE")]
    image_list: Option<PathBuf>,

    /// Output directory for the checkpoint and history
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    output: PathBuf,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Fraction of patches held out for validation
    #[arg(long, value_name = "FRACTION")]
    val_split: Option<f64>,

    /// Metric deciding the best checkpoint (loss, jaccard, val_loss, val_jaccard)
    #[arg(long, default_value = "loss")]
    monitor: Monitor,

    /// Continue from the checkpoint in the output directory
    #[arg(long)]
    resume: bool,

    /// List available presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Validate the preset and extract the corpus without training
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    let mut registry = PresetRegistry::builtin();
    if let Some(path) = &args.presets {
        registry
            .merge_file(path)
            .with_context(|| format!("Failed to load presets from {}", path.display()))?;
    }

    if args.list_presets {
        list_presets(&registry);
        return Ok(());
    }

    let name = args.preset.as_deref().context("--preset is required")?;
    let preset = registry
        .get(name)
        .with_context(|| format!("Invalid preset '{name}'"))?;

    let config = RunConfig {
        seed: args.seed,
        monitor: args.monitor,
        val_split: args.val_split,
        output_dir: args.output.clone(),
    };
    config.validate().context("Invalid run configuration")?;

    let image_ids = image_ids(&args)?;
    print_summary(&preset, &config, image_ids.len());

    let store = RawTileStore::new(&args.data);
    let corpus = PatchExtractor::new(&preset)
        .with_progress(true)
        .extract(&store, &image_ids)
        .context("Failed to extract patches")?;
    info!(
        "Extracted {} patches: image {:?}, mask {:?}",
        corpus.len(),
        corpus.image_shape(),
        corpus.mask_shape()
    );

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (mut train, mut validation) = match config.val_split {
        Some(fraction) => {
            let (train, val) = corpus
                .split(fraction, &mut rng)
                .context("Failed to split validation holdout")?;
            info!("Split {} training / {} validation patches", train.len(), val.len());
            (train, Some(val))
        }
        None => (corpus, None),
    };

    if args.dry_run {
        info!("Preset and data validated successfully (dry run)");
        return Ok(());
    }

    let mut manager = CheckpointManager::new(&config.output_dir);
    let previous = if args.resume {
        let checkpoint = manager
            .load_best()
            .context("Failed to read checkpoint metadata")?
            .with_context(|| format!("No checkpoint to resume in {}", config.output_dir.display()))?;
        if checkpoint.preset != preset.name {
            bail!(
                "Checkpoint was written by preset '{}', not '{}'",
                checkpoint.preset,
                preset.name
            );
        }
        if checkpoint.monitor != config.monitor {
            warn!(
                "Checkpoint monitored {}, this run monitors {}; best value carried over as is",
                checkpoint.monitor, config.monitor
            );
        }
        Some(checkpoint)
    } else {
        None
    };

    let normalization = if preset.normalize {
        let stats = match previous.as_ref().and_then(|c| c.normalization.clone()) {
            Some(stats) => stats,
            None => ChannelStats::compute(&train),
        };
        standardize(&stats, &mut train, validation.as_mut())?;
        Some(stats)
    } else {
        None
    };

    let factory = BurnFactory::<TrainBackend>::default();
    let mut model = build_model(&factory, &preset, &train).context("Failed to build model")?;

    let resume = match &previous {
        Some(_) => {
            let checkpoint = manager
                .restore(model.as_mut())
                .context("Failed to restore checkpoint")?;
            Some(ResumePoint::from(&checkpoint))
        }
        None => None,
    };

    let history_path = config.output_dir.join(HISTORY_FILE);
    let history = match resume {
        Some(_) => previous_history(&history_path)?,
        None => TrainingHistory::new(),
    };

    let mut trainer = Trainer::new(&preset, &config)
        .with_normalization(normalization)
        .with_resume(resume)
        .with_history(history);
    let outcome = trainer
        .run(model.as_mut(), &train, validation.as_ref(), &mut manager, &mut rng)
        .map(|_| ());

    trainer
        .history()
        .save(&history_path)
        .with_context(|| format!("Failed to write {}", history_path.display()))?;
    info!("History saved to {}", history_path.display());

    outcome.context("Training failed")?;

    let state = trainer.state();
    info!("");
    info!("Training Summary:");
    info!("  Epochs: {}", state.epochs_done);
    info!("  Checkpoints written: {}", state.checkpoints_written);
    if let Some(best) = state.best {
        info!("  Best {}: {:.6}", config.monitor, best);
    }
    info!("  Output: {}", config.output_dir.display());

    Ok(())
}

fn list_presets(registry: &PresetRegistry) {
    println!("Available presets:");
    for name in registry.names() {
        match registry.get(&name) {
            Ok(preset) => {
                let bands: Vec<&str> = preset.inputs.iter().map(|i| i.band.as_str()).collect();
                println!(
                    "  {:<28} {:<5} bands {:<12} mask {:>3}  {} stage(s), {} epochs",
                    name,
                    preset.arch.to_string(),
                    bands.join("+"),
                    preset.mask_patch_size,
                    preset.stages.len(),
                    preset.total_epochs()
                );
            }
            Err(e) => println!("  {:<28} invalid: {}", name, e),
        }
    }
}

/// Ids from `--images`, else from `--image-list` (blank lines and `#` comments skipped)
fn image_ids(args: &Args) -> Result<Vec<String>> {
    if !args.images.is_empty() {
        return Ok(args.images.clone());
    }
    match &args.image_list {
        Some(path) => read_image_list(path),
        None => bail!("No images given; pass --images or --image-list"),
    }
}

fn read_image_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read image list {}", path.display()))?;
    let ids: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect();
    if ids.is_empty() {
        bail!("Image list {} is empty", path.display());
    }
    Ok(ids)
}

/// History written by the run being resumed; empty if there is none
fn previous_history(path: &Path) -> Result<TrainingHistory> {
    if !path.exists() {
        warn!("No {} to continue, history restarts at the resume epoch", path.display());
        return Ok(TrainingHistory::new());
    }
    let history = TrainingHistory::load(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    info!("Continuing history of {} epochs", history.len());
    Ok(history)
}

fn standardize(
    stats: &ChannelStats,
    train: &mut PatchCorpus,
    validation: Option<&mut PatchCorpus>,
) -> Result<()> {
    stats.apply(train).context("Failed to normalize training patches")?;
    if let Some(val) = validation {
        stats.apply(val).context("Failed to normalize validation patches")?;
    }
    info!("Standardized {} channels", stats.channels());
    Ok(())
}

fn print_summary(preset: &Preset, config: &RunConfig, images: usize) {
    info!("");
    info!("Configuration Summary:");
    info!("  Preset: {}", preset.name);
    info!("  Architecture: {}", preset.arch);
    for input in &preset.inputs {
        info!("  Input: {} (band {}, downscale {})", input.name, input.band, input.downscale());
    }
    info!("  Mask patch: {} (downscale {})", preset.mask_patch_size, preset.mask_downscale);
    info!("  Batch mode: {:?}", preset.batch_mode);
    for (index, stage) in preset.stages.iter().enumerate() {
        info!(
            "  Stage {}: {} epochs, batch {}, {} lr {} decay {}",
            index + 1,
            stage.n_epoch,
            stage.batch_size,
            stage.optimizer.kind,
            stage.optimizer.lr,
            stage.optimizer.decay
        );
    }
    info!("  Monitor: {}", config.monitor);
    info!("  Seed: {}", config.seed);
    info!("  Images: {}", images);
    info!("  Output dir: {}", config.output_dir.display());
    info!("");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_image_list_skips_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.txt");
        fs::write(&path, "# train tiles\n6010_1_2\n\n  6040_2_2  \n").unwrap();
        assert_eq!(read_image_list(&path).unwrap(), vec!["6010_1_2", "6040_2_2"]);
    }

    #[test]
    fn test_empty_image_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.txt");
        fs::write(&path, "# nothing\n").unwrap();
        assert!(read_image_list(&path).is_err());
    }

    #[test]
    fn test_previous_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(HISTORY_FILE);
        assert!(previous_history(&path).unwrap().is_empty());

        fs::write(&path, r#"{"epochs": [{"global_epoch": 0, "stage": 0, "stage_epoch": 0,
            "learning_rate": 0.001, "batches": 4,
            "train": {"loss": 0.9, "jaccard": 0.1, "jaccard_int": 0.1, "accuracy": 0.5},
            "validation": null, "checkpointed": true}]}"#)
            .unwrap();
        let history = previous_history(&path).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history.epochs[0].checkpointed);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "train", "--preset", "unet_i", "--images", "a", "b", "--monitor", "val_jaccard",
            "--val-split", "0.1",
        ])
        .unwrap();
        assert_eq!(args.images, vec!["a", "b"]);
        assert_eq!(args.monitor, Monitor::ValJaccard);
        assert_eq!(args.val_split, Some(0.1));
        assert!(!args.resume);
    }
}
