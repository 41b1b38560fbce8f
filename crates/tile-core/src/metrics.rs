//! Step, epoch and run-level metric records.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Monitor;
use crate::Result;

/// Scores produced by one optimization or evaluation step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StepMetrics {
    /// Combined cross-entropy + Jaccard-complement loss
    pub loss: f64,
    /// Mean per-class soft Jaccard
    pub jaccard: f64,
    /// Mean per-class Jaccard with thresholded predictions in the intersection
    pub jaccard_int: f64,
    /// Binary pixel accuracy
    pub accuracy: f64,
}

/// Running mean of [`StepMetrics`] over the batches of an epoch.
#[derive(Debug, Clone, Default)]
pub struct MetricAccumulator {
    sum: StepMetrics,
    count: usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: &StepMetrics) {
        self.sum.loss += step.loss;
        self.sum.jaccard += step.jaccard;
        self.sum.jaccard_int += step.jaccard_int;
        self.sum.accuracy += step.accuracy;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of everything pushed so far; zeros when empty
    pub fn mean(&self) -> StepMetrics {
        if self.count == 0 {
            return StepMetrics::default();
        }
        let n = self.count as f64;
        StepMetrics {
            loss: self.sum.loss / n,
            jaccard: self.sum.jaccard / n,
            jaccard_int: self.sum.jaccard_int / n,
            accuracy: self.sum.accuracy / n,
        }
    }
}

/// Summary of one finished epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochRecord {
    /// Zero-based epoch counted across all stages
    pub global_epoch: usize,
    pub stage: usize,
    /// Zero-based epoch inside the stage
    pub stage_epoch: usize,
    /// Learning rate in effect at the end of the epoch
    pub learning_rate: f64,
    pub batches: usize,
    pub train: StepMetrics,
    pub validation: Option<StepMetrics>,
    /// Whether this epoch produced the checkpoint on disk
    pub checkpointed: bool,
}

impl EpochRecord {
    /// Value of the monitored metric for this epoch, if available
    pub fn monitored(&self, monitor: Monitor) -> Option<f64> {
        match monitor {
            Monitor::Loss => Some(self.train.loss),
            Monitor::Jaccard => Some(self.train.jaccard),
            Monitor::ValLoss => self.validation.map(|v| v.loss),
            Monitor::ValJaccard => self.validation.map(|v| v.jaccard),
        }
    }
}

/// Per-epoch history of a training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    /// Drops every record from `global_epoch` on
    pub fn retain_before(&mut self, global_epoch: usize) {
        self.epochs.retain(|e| e.global_epoch < global_epoch);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Number of epochs that wrote a checkpoint
    pub fn checkpoint_count(&self) -> usize {
        self.epochs.iter().filter(|e| e.checkpointed).count()
    }

    /// Epoch record holding the best monitored value
    pub fn best(&self, monitor: Monitor) -> Option<&EpochRecord> {
        let mut best: Option<(&EpochRecord, f64)> = None;
        for record in &self.epochs {
            let Some(value) = record.monitored(monitor) else {
                continue;
            };
            if monitor.improves(value, best.map(|(_, v)| v)) {
                best = Some((record, value));
            }
        }
        best.map(|(record, _)| record)
    }

    /// Writes the history as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(global_epoch: usize, loss: f64, val_jaccard: Option<f64>) -> EpochRecord {
        EpochRecord {
            global_epoch,
            stage: 0,
            stage_epoch: global_epoch,
            learning_rate: 1e-3,
            batches: 4,
            train: StepMetrics {
                loss,
                jaccard: 1.0 - loss,
                jaccard_int: 1.0 - loss,
                accuracy: 0.9,
            },
            validation: val_jaccard.map(|j| StepMetrics {
                loss: 1.0 - j,
                jaccard: j,
                jaccard_int: j,
                accuracy: 0.9,
            }),
            checkpointed: false,
        }
    }

    #[test]
    fn test_accumulator_mean() {
        let mut acc = MetricAccumulator::new();
        assert_eq!(acc.mean(), StepMetrics::default());

        acc.push(&StepMetrics {
            loss: 1.0,
            jaccard: 0.2,
            jaccard_int: 0.1,
            accuracy: 0.5,
        });
        acc.push(&StepMetrics {
            loss: 3.0,
            jaccard: 0.4,
            jaccard_int: 0.3,
            accuracy: 0.7,
        });

        let mean = acc.mean();
        assert_eq!(acc.count(), 2);
        assert!((mean.loss - 2.0).abs() < 1e-12);
        assert!((mean.jaccard - 0.3).abs() < 1e-12);
        assert!((mean.jaccard_int - 0.2).abs() < 1e-12);
        assert!((mean.accuracy - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_retain_before() {
        let mut history = TrainingHistory::new();
        for epoch in 0..5 {
            history.push(record(epoch, 1.0, None));
        }
        history.retain_before(3);
        let kept: Vec<usize> = history.epochs.iter().map(|e| e.global_epoch).collect();
        assert_eq!(kept, vec![0, 1, 2]);

        history.retain_before(0);
        assert!(history.is_empty());
    }

    #[test]
    fn test_best_respects_direction() {
        let mut history = TrainingHistory::new();
        history.push(record(0, 0.8, Some(0.3)));
        history.push(record(1, 0.5, Some(0.6)));
        history.push(record(2, 0.6, Some(0.4)));

        assert_eq!(history.best(Monitor::Loss).unwrap().global_epoch, 1);
        assert_eq!(history.best(Monitor::ValJaccard).unwrap().global_epoch, 1);
        assert_eq!(history.best(Monitor::Jaccard).unwrap().global_epoch, 1);
    }

    #[test]
    fn test_validation_monitor_without_validation() {
        let mut history = TrainingHistory::new();
        history.push(record(0, 0.8, None));
        assert!(history.best(Monitor::ValLoss).is_none());
    }

    #[test]
    fn test_history_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("history.json");

        let mut history = TrainingHistory::new();
        let mut first = record(0, 0.7, None);
        first.checkpointed = true;
        history.push(first);
        history.push(record(1, 0.9, None));
        history.save(&path).unwrap();

        let loaded = TrainingHistory::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.checkpoint_count(), 1);
        assert_eq!(loaded.epochs[0], history.epochs[0]);
    }
}
