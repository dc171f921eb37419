//! Training orchestrator: the hexagonal core of a training run.
//!
//! [`TrainingOrchestrator`] owns one [`Environment`] and borrows the
//! learning collaborators for the run.  It selects actions by phase,
//! feeds transitions to memory, trains the agent, paces the loop and
//! routes every environment fault through the one-shot
//! [`RecoveryCascade`].
//!
//! ```text
//!   Agent ◀──┐                                   ┌──▶ EventSink
//!            │  ┌─────────────────────────────┐  │
//!   Memory ◀─┼──│    TrainingOrchestrator     │──┼──▶ StoragePort (fault log)
//!            │  │ schedule · pacing · recovery│  │
//!            │  └──────────────┬──────────────┘  │
//!            │                 ▼                 │
//!            │            Environment            │
//! ```

use std::mem;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{ActionType, SystemConfig};
use crate::control::action::ActionSpace;
use crate::diagnostics::FaultLog;
use crate::env::{Environment, StepOutcome};
use crate::error::{EnvironmentError, FaultRecord, TrainingError};
use crate::pacing::LoopPacer;
use crate::recovery::RecoveryCascade;
use crate::schedule::{ExplorationNoise, Schedule, TrainingPhase};

use super::events::{EpisodeSummary, TrainingEvent};
use super::ports::{Agent, EventSink, PolicyMode, ReplayMemory, ServoChannel, StoragePort, Transition};

const ERROR_MODELS_TAG: &str = "error_models";
const FINAL_MODELS_TAG: &str = "final_models";

/// Borrowed collaborators for one training run.
pub struct Collaborators<'a> {
    pub agent: &'a mut dyn Agent,
    pub memory: &'a mut dyn ReplayMemory,
    pub sink: &'a mut dyn EventSink,
    pub storage: &'a mut dyn StoragePort,
}

/// Result of [`TrainingOrchestrator::environment_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Stepped {
    pub outcome: StepOutcome,
    /// The step faulted and was recovered.  `outcome` then carries the
    /// post-recovery observation with zero reward, and must not be stored.
    pub recovered: bool,
}

pub struct TrainingOrchestrator<'a, C> {
    env: Environment<C>,
    agent: &'a mut dyn Agent,
    memory: &'a mut dyn ReplayMemory,
    sink: &'a mut dyn EventSink,
    storage: &'a mut dyn StoragePort,
    fault_log: FaultLog,
    pacer: LoopPacer,
    schedule: Schedule,
    noise: ExplorationNoise,
    action_space: ActionSpace,
    cascade: RecoveryCascade,
    rng: StdRng,
    run_dir: PathBuf,
    eval_episodes: u32,
    episode_horizon: Option<u64>,
    total_step: u64,
    episodes_completed: u64,
}

impl<'a, C: ServoChannel> TrainingOrchestrator<'a, C> {
    pub fn new(
        env: Environment<C>,
        collaborators: Collaborators<'a>,
        pacer: LoopPacer,
        config: &SystemConfig,
        run_dir: impl Into<PathBuf>,
        seed: u64,
    ) -> Self {
        let Collaborators {
            agent,
            memory,
            sink,
            storage,
        } = collaborators;
        let mut fault_log = FaultLog::new();
        fault_log.init(storage);
        let training = &config.training;

        Self {
            env,
            agent,
            memory,
            sink,
            storage,
            fault_log,
            pacer,
            schedule: Schedule::from_config(training),
            noise: ExplorationNoise::new(training.noise_scale, training.noise_decay, training.min_noise),
            action_space: ActionSpace::from_config(&config.gripper),
            cascade: RecoveryCascade::new(),
            rng: StdRng::seed_from_u64(seed),
            run_dir: run_dir.into(),
            eval_episodes: training.eval_episodes,
            episode_horizon: config.environment.episode_horizon.map(u64::from),
            total_step: 0,
            episodes_completed: 0,
        }
    }

    // ── Accessors ──

    pub fn environment(&self) -> &Environment<C> {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment<C> {
        &mut self.env
    }

    pub fn total_step(&self) -> u64 {
        self.total_step
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.cascade.attempts()
    }

    pub fn fault_log(&self) -> &FaultLog {
        &self.fault_log
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    // ── Fault-tolerant environment access ──

    /// Reset the environment.  A failed reset gets one recovery: home and
    /// resume, then a second reset.
    pub fn environment_reset(&mut self) -> Result<Vec<f64>, TrainingError> {
        match self.env.reset() {
            Ok(observation) => Ok(observation),
            Err(e) => self.handle_fault(&e, &[], |env| {
                env.recover()?;
                env.reset()
            }),
        }
    }

    /// Step the environment.  A recovered fault yields the post-recovery
    /// observation with zero reward and the episode carries on.
    pub fn environment_step(&mut self, action: &[i32]) -> Result<Stepped, TrainingError> {
        match self.env.step(action) {
            Ok(outcome) => Ok(Stepped {
                outcome,
                recovered: false,
            }),
            Err(e) => {
                let observation = self.handle_fault(&e, action, |env| env.recover())?;
                Ok(Stepped {
                    outcome: StepOutcome {
                        observation,
                        reward: 0.0,
                        done: false,
                        truncated: false,
                    },
                    recovered: true,
                })
            }
        }
    }

    // ── Training ──

    /// Run the whole step budget.
    pub fn train(&mut self) -> Result<(), TrainingError> {
        let max_steps = self.schedule.max_steps;
        info!(
            "Training for {max_steps} steps ({} exploration), action type {:?}",
            self.schedule.max_exploration,
            self.env.action_type()
        );
        self.sink.emit(&TrainingEvent::Started {
            max_steps,
            observation_size: self.env.observation_size(),
            action_dims: self.action_space.dims(),
        });

        let mut phase = self.schedule.phase(0);
        self.sink.emit(&TrainingEvent::PhaseChanged { total_step: 0, phase });

        let mut state = self.environment_reset()?;
        let mut episode_reward = 0.0;
        let mut episode_steps = 0u64;
        let mut evaluate = false;

        for total_step in 0..max_steps {
            self.total_step = total_step;
            let step_start = self.pacer.now();

            let current = self.schedule.phase(total_step);
            if current != phase {
                info!("Total T:{total_step} entering {current} phase");
                phase = current;
                self.sink.emit(&TrainingEvent::PhaseChanged { total_step, phase });
            }

            let action = match phase {
                TrainingPhase::Exploration => self.action_space.sample(&mut self.rng),
                TrainingPhase::PolicyTraining => {
                    let noise_scale = self.noise.step();
                    let normalized = self.agent.select_action(&state, PolicyMode::Explore { noise_scale });
                    self.action_space.denormalize(&normalized)
                }
            };

            let stepped = self.environment_step(&action)?;
            self.pace(step_start);
            episode_steps += 1;

            let outcome = stepped.outcome;
            if stepped.recovered {
                info!("Total T:{total_step} faulted step discarded after recovery");
                state = outcome.observation;
            } else {
                let normalized = self.action_space.normalize(&action);
                let mut reward = outcome.reward;
                if phase == TrainingPhase::PolicyTraining {
                    reward += self.agent.intrinsic_reward(&state, &normalized, &outcome.observation);
                }
                episode_reward += outcome.reward;
                self.memory.add(Transition {
                    state: mem::take(&mut state),
                    action: normalized,
                    reward,
                    next_state: outcome.observation.clone(),
                    done: outcome.done,
                });
                state = outcome.observation;
            }

            if self.schedule.should_train(total_step, self.memory.len()) {
                for _ in 0..self.schedule.gradient_steps {
                    let batch = self.memory.sample(self.schedule.batch_size);
                    let info = self.agent.train_policy(&batch);
                    debug!("Total T:{total_step} train info {info:?}");
                }
            }

            if self.schedule.evaluation_due(total_step) {
                evaluate = true;
            }

            let truncated = !outcome.done && self.horizon_reached(episode_steps);
            if truncated {
                if let Err(e) = self.env.truncate() {
                    warn!("Could not truncate episode: {e}");
                }
            }

            if outcome.done || truncated {
                self.episodes_completed += 1;
                info!(
                    "Total T:{} Episode {} was completed with {} steps taking reward of {:.3}",
                    total_step + 1,
                    self.episodes_completed,
                    episode_steps,
                    episode_reward
                );
                self.sink.emit(&TrainingEvent::EpisodeCompleted(EpisodeSummary {
                    episode: self.episodes_completed,
                    total_step,
                    steps: episode_steps,
                    reward: episode_reward,
                    truncated,
                }));

                if evaluate {
                    self.evaluation_loop()?;
                    evaluate = false;
                }

                state = self.environment_reset()?;
                episode_reward = 0.0;
                episode_steps = 0;
            }
        }

        self.sink.emit(&TrainingEvent::Finished {
            total_steps: max_steps,
            episodes: self.episodes_completed,
            recoveries: self.cascade.recoveries(),
        });
        if let Err(e) = self.env.close() {
            warn!("Failed to release gripper after training: {e}");
        }
        self.agent.save_models(FINAL_MODELS_TAG, &self.run_dir)?;
        Ok(())
    }

    /// Greedy rollouts without learning.  Returns the mean episode reward.
    pub fn evaluation_loop(&mut self) -> Result<f64, TrainingError> {
        let total_step = self.total_step;
        info!("Total T:{} starting evaluation of {} episodes", total_step + 1, self.eval_episodes);

        let mut total_reward = 0.0;
        for episode in 0..self.eval_episodes {
            let mut state = self.environment_reset()?;
            let mut episode_reward = 0.0;
            let mut steps = 0u64;
            loop {
                let step_start = self.pacer.now();
                let normalized = self.agent.select_action(&state, PolicyMode::Greedy);
                let action = self.action_space.denormalize(&normalized);
                let stepped = self.environment_step(&action)?;
                self.pace(step_start);
                steps += 1;

                episode_reward += stepped.outcome.reward;
                state = stepped.outcome.observation;
                if stepped.outcome.done {
                    break;
                }
                if self.horizon_reached(steps) {
                    if let Err(e) = self.env.truncate() {
                        warn!("Could not truncate evaluation episode: {e}");
                    }
                    break;
                }
            }
            info!("Evaluation episode {} reward {episode_reward:.3} in {steps} steps", episode + 1);
            total_reward += episode_reward;
        }

        let average_reward = if self.eval_episodes == 0 {
            0.0
        } else {
            total_reward / f64::from(self.eval_episodes)
        };
        self.sink.emit(&TrainingEvent::EvaluationCompleted {
            total_step,
            episodes: self.eval_episodes,
            average_reward,
        });
        Ok(average_reward)
    }

    // ── Internals ──

    fn pace(&mut self, step_start: std::time::Duration) {
        if self.env.action_type() == ActionType::Velocity {
            self.pacer.pace(step_start);
        }
    }

    fn horizon_reached(&self, steps: u64) -> bool {
        self.episode_horizon.is_some_and(|h| steps >= h)
    }

    fn handle_fault<T>(
        &mut self,
        err: &EnvironmentError,
        action: &[i32],
        recover: impl FnOnce(&mut Environment<C>) -> Result<T, EnvironmentError>,
    ) -> Result<T, TrainingError> {
        let fault = FaultRecord::from_environment(err)
            .at_step(self.total_step)
            .with_action(action);
        self.persist(&fault);
        self.sink.emit(&TrainingEvent::FaultDetected(fault.clone()));

        let env = &mut self.env;
        match self.cascade.run(&fault, || recover(env)) {
            Ok(value) => {
                self.sink.emit(&TrainingEvent::Recovered(fault));
                Ok(value)
            }
            Err(record) => {
                if record != fault {
                    self.persist(&record);
                }
                Err(self.fatal(record))
            }
        }
    }

    /// Stop the run: release the gripper, save the models, report.
    fn fatal(&mut self, record: FaultRecord) -> TrainingError {
        let motor = record
            .motor_id
            .map_or_else(|| "n/a".to_string(), |id| id.to_string());
        error!(
            "Fatal fault from {} (motor {}) during action {:?}: {}",
            record.component,
            motor,
            record.action.as_slice(),
            record.message
        );

        if let Err(e) = self.env.close() {
            warn!("Failed to release gripper during shutdown: {e}");
        }
        match self.agent.save_models(ERROR_MODELS_TAG, &self.run_dir) {
            Ok(()) => info!("Saved {ERROR_MODELS_TAG} to {}", self.run_dir.display()),
            Err(e) => error!("Failed to save {ERROR_MODELS_TAG}: {e}"),
        }

        self.sink.emit(&TrainingEvent::Fatal(record.clone()));
        TrainingError::Fatal(record)
    }

    fn persist(&mut self, record: &FaultRecord) {
        if let Err(e) = self.fault_log.append(self.storage, record) {
            warn!("Failed to persist fault record: {e}");
        }
    }
}
