//! Learning rate scheduling.
//!
//! Schedules advance once per optimizer step, not per epoch, and restart
//! with every stage.

use serde::{Deserialize, Serialize};
use tile_core::OptimizerConfig;

/// Learning rate scheduler type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerType {
    /// Constant learning rate (no scheduling)
    #[default]
    Constant,

    /// Inverse-time decay: `lr / (1 + decay * t)` after `t` steps
    InverseTimeDecay { decay: f64 },
}

impl SchedulerType {
    /// Schedule described by an optimizer config's `decay`
    pub fn for_optimizer(config: &OptimizerConfig) -> Self {
        if config.decay > 0.0 {
            Self::InverseTimeDecay {
                decay: config.decay,
            }
        } else {
            Self::Constant
        }
    }
}

/// Learning rate scheduler
#[derive(Debug, Clone)]
pub struct LearningRateScheduler {
    scheduler_type: SchedulerType,
    base_lr: f64,
    steps: usize,
}

impl LearningRateScheduler {
    pub fn new(scheduler_type: SchedulerType, base_lr: f64) -> Self {
        Self {
            scheduler_type,
            base_lr,
            steps: 0,
        }
    }

    /// Scheduler for a stage's optimizer config
    pub fn from_optimizer(config: &OptimizerConfig) -> Self {
        Self::new(SchedulerType::for_optimizer(config), config.lr)
    }

    /// Learning rate for the next step
    pub fn get_lr(&self) -> f64 {
        match self.scheduler_type {
            SchedulerType::Constant => self.base_lr,
            SchedulerType::InverseTimeDecay { decay } => {
                self.base_lr / (1.0 + decay * self.steps as f64)
            }
        }
    }

    /// Records one optimizer step
    pub fn step(&mut self) {
        self.steps += 1;
    }

    /// Optimizer steps taken so far
    pub fn steps(&self) -> usize {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_scheduler() {
        let mut scheduler = LearningRateScheduler::new(SchedulerType::Constant, 0.001);
        assert_eq!(scheduler.get_lr(), 0.001);

        scheduler.step();
        scheduler.step();
        assert_eq!(scheduler.get_lr(), 0.001);
        assert_eq!(scheduler.steps(), 2);
    }

    #[test]
    fn test_inverse_time_decay() {
        let mut scheduler =
            LearningRateScheduler::new(SchedulerType::InverseTimeDecay { decay: 0.5 }, 0.001);
        assert_eq!(scheduler.get_lr(), 0.001);

        scheduler.step();
        assert!((scheduler.get_lr() - 0.001 / 1.5).abs() < 1e-12);

        scheduler.step();
        assert!((scheduler.get_lr() - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_from_optimizer() {
        let flat = LearningRateScheduler::from_optimizer(&OptimizerConfig::adam(1e-4, 0.0));
        assert_eq!(flat.get_lr(), 1e-4);

        let mut decayed = LearningRateScheduler::from_optimizer(&OptimizerConfig::adam(1e-3, 1e-3));
        for _ in 0..1000 {
            decayed.step();
        }
        assert!((decayed.get_lr() - 5e-4).abs() < 1e-12);
    }
}
