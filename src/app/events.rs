//! Outbound training events.
//!
//! The [`TrainingOrchestrator`](super::trainer::TrainingOrchestrator) emits
//! these through the [`EventSink`](super::ports::EventSink) port.  Adapters
//! on the other side decide what to do with them: log a line, append to a
//! CSV, push to a dashboard.

use crate::error::FaultRecord;
use crate::schedule::TrainingPhase;

/// Structured events emitted by the training loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingEvent {
    /// Training is about to start.
    Started { max_steps: u64, observation_size: usize, action_dims: usize },

    /// Step threshold crossed between exploration and policy training.
    PhaseChanged { total_step: u64, phase: TrainingPhase },

    /// A training episode ended (terminated or truncated).
    EpisodeCompleted(EpisodeSummary),

    /// An evaluation round finished.
    EvaluationCompleted { total_step: u64, episodes: u32, average_reward: f64 },

    /// A fault surfaced from the environment.
    FaultDetected(FaultRecord),

    /// A recovery attempt brought the system back.
    Recovered(FaultRecord),

    /// A fault could not be recovered; the loop is stopping.
    Fatal(FaultRecord),

    /// The step budget is exhausted.
    Finished { total_steps: u64, episodes: u64, recoveries: u32 },
}

/// Per-episode statistics.  Rewards are extrinsic only.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub episode: u64,
    pub total_step: u64,
    pub steps: u64,
    pub reward: f64,
    pub truncated: bool,
}
