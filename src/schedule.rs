//! Training schedule: phase selection, exploration-noise decay, and the
//! training/evaluation cadence.
//!
//! Everything here is a pure function of the global step counter.
//!
//! ```text
//!   step:  0 ─────────── max_exploration ─────────────────── max_steps
//!          │ Exploration │ PolicyTraining                          │
//!          │ uniform     │ agent + decaying noise                  │
//!          │ no training │ train every `steps_per_train` steps     │
//!          └─────────────┴── evaluation due every `steps_per_evaluation`
//! ```

use core::fmt;

use crate::config::TrainingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    /// Uniform-random actions, memory is being filled.
    Exploration,
    /// Agent-selected actions with exploration noise.
    PolicyTraining,
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exploration => "exploration",
            Self::PolicyTraining => "policy-training",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplorationNoise {
    scale: f64,
    decay: f64,
    floor: f64,
}

impl ExplorationNoise {
    pub fn new(scale: f64, decay: f64, floor: f64) -> Self {
        Self {
            scale,
            decay,
            floor,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Decay once and return the scale to use for this step.
    pub fn step(&mut self) -> f64 {
        self.scale = (self.scale * self.decay).max(self.floor);
        self.scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub max_steps: u64,
    pub max_exploration: u64,
    pub steps_per_train: u64,
    pub steps_per_evaluation: u64,
    pub gradient_steps: u32,
    pub batch_size: usize,
}

impl Schedule {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            max_steps: config.max_steps_training,
            max_exploration: config.max_steps_exploration,
            steps_per_train: config.steps_per_train.max(1),
            steps_per_evaluation: config.steps_per_evaluation.max(1),
            gradient_steps: config.gradient_steps,
            batch_size: config.batch_size,
        }
    }

    pub fn phase(&self, step: u64) -> TrainingPhase {
        if step < self.max_exploration {
            TrainingPhase::Exploration
        } else {
            TrainingPhase::PolicyTraining
        }
    }

    /// Whether to run `gradient_steps` updates after `step`.
    pub fn should_train(&self, step: u64, memory_len: usize) -> bool {
        step >= self.max_exploration
            && step % self.steps_per_train == 0
            && memory_len >= self.batch_size
    }

    /// Whether an evaluation should run at the next episode boundary.
    pub fn evaluation_due(&self, step: u64) -> bool {
        (step + 1) % self.steps_per_evaluation == 0
    }
}
