//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each [`TrainingEvent`] as one log
//! line.  A CSV or dashboard adapter would implement the same trait.

use log::{error, info, warn};

use crate::app::events::TrainingEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`TrainingEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &TrainingEvent) {
        match event {
            TrainingEvent::Started {
                max_steps,
                observation_size,
                action_dims,
            } => {
                info!("START | steps={max_steps} obs={observation_size} act={action_dims}");
            }
            TrainingEvent::PhaseChanged { total_step, phase } => {
                info!("PHASE | T={total_step} -> {phase}");
            }
            TrainingEvent::EpisodeCompleted(s) => {
                info!(
                    "EPISODE | #{} | T={} | steps={} | reward={:.3}{}",
                    s.episode,
                    s.total_step + 1,
                    s.steps,
                    s.reward,
                    if s.truncated { " | truncated" } else { "" }
                );
            }
            TrainingEvent::EvaluationCompleted {
                total_step,
                episodes,
                average_reward,
            } => {
                info!("EVAL | T={} | episodes={episodes} | avg_reward={average_reward:.3}", total_step + 1);
            }
            TrainingEvent::FaultDetected(fault) => {
                warn!("FAULT | {fault}");
            }
            TrainingEvent::Recovered(fault) => {
                info!("RECOVERED | {} at T={}", fault.component, fault.total_step);
            }
            TrainingEvent::Fatal(fault) => {
                error!("FATAL | {fault}");
            }
            TrainingEvent::Finished {
                total_steps,
                episodes,
                recoveries,
            } => {
                info!("FINISH | steps={total_steps} episodes={episodes} recoveries={recoveries}");
            }
        }
    }
}
