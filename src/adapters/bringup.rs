//! Bring-up collaborators.
//!
//! A uniform-random [`Agent`] and a [`ReplayMemory`] that keeps nothing.
//! Together they drive the full hardware loop (faults, recovery, pacing,
//! evaluation) without a learning library.  Because the memory never fills
//! a batch, `train_policy` is never called.

use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::app::ports::{Agent, PolicyMode, ReplayMemory, StorageError, TrainInfo, Transition};

pub struct RandomAgent {
    action_dims: usize,
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(action_dims: usize, seed: u64) -> Self {
        Self {
            action_dims,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn select_action(&mut self, _state: &[f64], _mode: PolicyMode) -> Vec<f64> {
        (0..self.action_dims)
            .map(|_| self.rng.gen_range(-1.0..=1.0))
            .collect()
    }

    fn train_policy(&mut self, _batch: &[Transition]) -> TrainInfo {
        TrainInfo::new()
    }

    fn save_models(&mut self, tag: &str, dir: &Path) -> Result<(), StorageError> {
        info!("RandomAgent has no parameters; skipping {tag} in {}", dir.display());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DiscardMemory {
    seen: u64,
}

impl DiscardMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions offered so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl ReplayMemory for DiscardMemory {
    fn add(&mut self, _transition: Transition) {
        self.seen += 1;
    }

    fn sample(&mut self, _batch_size: usize) -> Vec<Transition> {
        Vec::new()
    }

    fn len(&self) -> usize {
        0
    }
}
