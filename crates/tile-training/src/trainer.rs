//! Staged training orchestration.
//!
//! The trainer walks a preset's stages in order against one model:
//! - fresh optimizer per stage, same trainable state throughout
//! - per epoch: sample, gather, augment, step
//! - optional validation pass after every epoch
//! - checkpoint on strict improvement of the monitored metric
//! - resumption after the epoch of an earlier checkpoint

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tile_core::{
    EpochRecord, Error, MetricAccumulator, Preset, Result, RunConfig, StepMetrics,
    TrainingHistory,
};
use tile_dataset::{Augmenter, BatchSampler, ChannelStats, PatchCorpus};
use tracing::{debug, info};

use crate::checkpoint::{Checkpoint, CheckpointSink};
use crate::segmenter::SegmentationModel;

/// Where a run stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingPhase {
    Idle,
    Running { stage: usize },
    /// The last finished epoch of `stage` wrote the checkpoint
    Checkpointed { stage: usize },
    Done,
}

/// Point to continue a run from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    /// First global epoch still to run
    pub next_epoch: usize,
    /// Best monitored value so far
    pub best: f64,
}

impl From<&Checkpoint> for ResumePoint {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            next_epoch: checkpoint.global_epoch + 1,
            best: checkpoint.value,
        }
    }
}

/// Training state for reporting and resumption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState {
    pub phase: TrainingPhase,
    /// Epochs finished, counted across stages (including resumed-over ones)
    pub epochs_done: usize,
    pub best: Option<f64>,
    pub checkpoints_written: usize,
    pub history: TrainingHistory,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self {
            phase: TrainingPhase::Idle,
            epochs_done: 0,
            best: None,
            checkpoints_written: 0,
            history: TrainingHistory::default(),
        }
    }
}

/// Runs a preset's schedule against one model
pub struct Trainer<'a> {
    preset: &'a Preset,
    config: &'a RunConfig,
    normalization: Option<ChannelStats>,
    resume: Option<ResumePoint>,
    state: TrainingState,
}

impl<'a> Trainer<'a> {
    pub fn new(preset: &'a Preset, config: &'a RunConfig) -> Self {
        Self {
            preset,
            config,
            normalization: None,
            resume: None,
            state: TrainingState::default(),
        }
    }

    /// Statistics the corpora were standardized with, recorded in checkpoints
    pub fn with_normalization(mut self, stats: Option<ChannelStats>) -> Self {
        self.normalization = stats;
        self
    }

    /// Skips epochs up to `point.next_epoch` and starts from its best value
    pub fn with_resume(mut self, point: Option<ResumePoint>) -> Self {
        self.resume = point;
        self
    }

    /// Records of an earlier run to continue.
    ///
    /// Records at or after the first epoch this run executes are dropped
    /// before new ones are appended, so without a resume point nothing is
    /// kept.
    pub fn with_history(mut self, history: TrainingHistory) -> Self {
        self.state.history = history;
        self
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn phase(&self) -> TrainingPhase {
        self.state.phase
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.state.history
    }

    /// Consumes the trainer, keeping the final state
    pub fn into_state(self) -> TrainingState {
        self.state
    }

    fn check_inputs(
        &self,
        model: &dyn SegmentationModel,
        train: &PatchCorpus,
        validation: Option<&PatchCorpus>,
    ) -> Result<()> {
        let monitor = self.config.monitor;
        if monitor.needs_validation() && validation.is_none() {
            return Err(Error::Config(format!(
                "monitor '{monitor}' needs a validation holdout"
            )));
        }
        let spec = model.spec();
        if train.image_shape() != spec.input_shape() || train.mask_shape() != spec.output_shape() {
            return Err(Error::Training(format!(
                "corpus patches {:?} / {:?} do not match model input {:?} / output {:?}",
                train.image_shape(),
                train.mask_shape(),
                spec.input_shape(),
                spec.output_shape()
            )));
        }
        if let Some(val) = validation {
            if val.image_shape() != train.image_shape() || val.mask_shape() != train.mask_shape() {
                return Err(Error::Data(
                    "validation patches differ in shape from training patches".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Runs every remaining epoch of every stage.
    ///
    /// On error the run stops where it is; whatever checkpoint the sink
    /// holds stays as the result.
    pub fn run<R: Rng>(
        &mut self,
        model: &mut dyn SegmentationModel,
        train: &PatchCorpus,
        validation: Option<&PatchCorpus>,
        sink: &mut dyn CheckpointSink,
        rng: &mut R,
    ) -> Result<&TrainingState> {
        self.check_inputs(&*model, train, validation)?;

        let preset = self.preset;
        let total_epochs = preset.total_epochs();
        let first_epoch = match self.resume {
            Some(point) => {
                self.state.best = Some(point.best);
                info!(
                    "Resuming at epoch {}/{} with best {} = {:.6}",
                    point.next_epoch + 1,
                    total_epochs,
                    self.config.monitor,
                    point.best
                );
                point.next_epoch.min(total_epochs)
            }
            None => 0,
        };
        self.state.history.retain_before(first_epoch);
        self.state.epochs_done = first_epoch;

        let mut stage_start = 0;
        for (stage_index, stage) in preset.stages.iter().enumerate() {
            let stage_end = stage_start + stage.n_epoch;
            if stage_end <= first_epoch {
                stage_start = stage_end;
                continue;
            }

            info!(
                "Stage {}/{}: {} epochs, batch size {}, {:?} lr {} decay {}, jaccard weight {}",
                stage_index + 1,
                preset.stages.len(),
                stage.n_epoch,
                stage.batch_size,
                stage.optimizer.kind,
                stage.optimizer.lr,
                stage.optimizer.decay,
                stage.loss_jac_weight
            );
            model.configure_optimizer(&stage.optimizer)?;
            let mut sampler = BatchSampler::new(
                train.len(),
                stage.batch_size,
                preset.batch_mode,
                stage.epoch_batches,
                ChaCha8Rng::seed_from_u64(rng.gen()),
            )?;
            let augmenter = Augmenter::new(stage.augment.clone());

            for stage_epoch in 0..stage.n_epoch {
                let global_epoch = stage_start + stage_epoch;
                if global_epoch < first_epoch {
                    continue;
                }
                self.state.phase = TrainingPhase::Running { stage: stage_index };

                let mut acc = MetricAccumulator::new();
                for indices in sampler.epoch_iter() {
                    let mut batch = train.gather(&indices);
                    augmenter.augment_batch(&mut batch, rng);
                    let metrics = model.train_step(&batch, stage.loss_jac_weight)?;
                    if !metrics.loss.is_finite() {
                        return Err(Error::Training(format!(
                            "non-finite loss {} at epoch {}",
                            metrics.loss,
                            global_epoch + 1
                        )));
                    }
                    acc.push(&metrics);
                }

                let validation_metrics = match validation {
                    Some(val) => {
                        let metrics = evaluate_corpus(&*model, val, stage.batch_size, stage.loss_jac_weight)?;
                        if !metrics.loss.is_finite() {
                            return Err(Error::Training(format!(
                                "non-finite validation loss {} at epoch {}",
                                metrics.loss,
                                global_epoch + 1
                            )));
                        }
                        Some(metrics)
                    }
                    None => None,
                };

                let mut record = EpochRecord {
                    global_epoch,
                    stage: stage_index,
                    stage_epoch,
                    learning_rate: model.learning_rate(),
                    batches: acc.count(),
                    train: acc.mean(),
                    validation: validation_metrics,
                    checkpointed: false,
                };
                log_epoch(&record, total_epochs);

                let monitor = self.config.monitor;
                if let Some(value) = record.monitored(monitor) {
                    if monitor.improves(value, self.state.best) {
                        let checkpoint = Checkpoint::new(
                            preset.name.clone(),
                            preset.arch,
                            stage_index,
                            stage_epoch,
                            global_epoch,
                            monitor,
                            value,
                            train.channel_layout().to_vec(),
                            self.normalization.clone(),
                        );
                        sink.write(&*model, &checkpoint)?;
                        match self.state.best {
                            Some(previous) => info!("{monitor} improved from {previous:.6} to {value:.6}"),
                            None => info!("{monitor} = {value:.6}"),
                        }
                        self.state.best = Some(value);
                        self.state.checkpoints_written += 1;
                        self.state.phase = TrainingPhase::Checkpointed { stage: stage_index };
                        record.checkpointed = true;
                    } else {
                        debug!("{monitor} = {value:.6}, no improvement");
                    }
                }

                self.state.history.push(record);
                self.state.epochs_done = global_epoch + 1;
            }
            stage_start = stage_end;
        }

        self.state.phase = TrainingPhase::Done;
        info!(
            "Training finished: {} epochs, {} checkpoints, best {} = {}",
            self.state.epochs_done,
            self.state.checkpoints_written,
            self.config.monitor,
            self.state
                .best
                .map(|b| format!("{b:.6}"))
                .unwrap_or_else(|| "n/a".to_string())
        );
        Ok(&self.state)
    }
}

/// Scores a whole corpus in order, weighting batches by their size
pub fn evaluate_corpus(
    model: &dyn SegmentationModel,
    corpus: &PatchCorpus,
    batch_size: usize,
    jac_weight: f64,
) -> Result<StepMetrics> {
    let indices: Vec<usize> = (0..corpus.len()).collect();
    let mut sum = StepMetrics::default();
    for chunk in indices.chunks(batch_size.max(1)) {
        let m = model.evaluate(&corpus.gather(chunk), jac_weight)?;
        let w = chunk.len() as f64;
        sum.loss += m.loss * w;
        sum.jaccard += m.jaccard * w;
        sum.jaccard_int += m.jaccard_int * w;
        sum.accuracy += m.accuracy * w;
    }
    let n = corpus.len().max(1) as f64;
    Ok(StepMetrics {
        loss: sum.loss / n,
        jaccard: sum.jaccard / n,
        jaccard_int: sum.jaccard_int / n,
        accuracy: sum.accuracy / n,
    })
}

fn log_epoch(record: &EpochRecord, total_epochs: usize) {
    let t = &record.train;
    match &record.validation {
        Some(v) => info!(
            "Epoch {}/{} (stage {}): loss={:.4} jaccard={:.4} jaccard_int={:.4} acc={:.4} | val_loss={:.4} val_jaccard={:.4} val_jaccard_int={:.4}",
            record.global_epoch + 1,
            total_epochs,
            record.stage + 1,
            t.loss,
            t.jaccard,
            t.jaccard_int,
            t.accuracy,
            v.loss,
            v.jaccard,
            v.jaccard_int
        ),
        None => info!(
            "Epoch {}/{} (stage {}): loss={:.4} jaccard={:.4} jaccard_int={:.4} acc={:.4}",
            record.global_epoch + 1,
            total_epochs,
            record.stage + 1,
            t.loss,
            t.jaccard,
            t.jaccard_int,
            t.accuracy
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_core::Monitor;

    #[test]
    fn test_training_state_default() {
        let state = TrainingState::default();
        assert_eq!(state.phase, TrainingPhase::Idle);
        assert_eq!(state.epochs_done, 0);
        assert!(state.best.is_none());
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_resume_point_from_checkpoint() {
        let checkpoint = Checkpoint::new(
            "unet_i",
            tile_core::ArchId::Unet,
            0,
            6,
            6,
            Monitor::Loss,
            0.125,
            Vec::new(),
            None,
        );
        let point = ResumePoint::from(&checkpoint);
        assert_eq!(point.next_epoch, 7);
        assert_eq!(point.best, 0.125);
    }
}
