//! Environment: goal, reward and termination over real hardware.
//!
//! Owns the gripper and the object pose source for its whole lifetime.
//! Within one step the order is fixed and never reordered for latency:
//!
//! ```text
//!   pre-move pose ──▶ gripper move ──▶ post-move pose ──▶ reward / done
//! ```
//!
//! A fault anywhere in that chain is returned as an [`EnvironmentError`];
//! what to do about it (recover, abort) is the orchestrator's decision.
//! Note that a motion, once commanded, cannot be cancelled: a fault is only
//! observed after the transaction that carried it completes.

pub mod episode;
pub mod observation;
pub mod task;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::app::ports::ServoChannel;
use crate::config::{ActionType, SystemConfig};
use crate::drivers::gripper::GripperController;
use crate::error::EnvironmentError;
use crate::sensors::{PoseReading, PoseSource, PoseSourceKind};
use episode::{EpisodeState, EpisodeTracker};
use observation::ObservationLayout;
use task::{Goal, RewardShaping, Task};

/// Result of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Vec<f64>,
    pub reward: f64,
    pub done: bool,
    /// Always false from the environment's own logic.
    pub truncated: bool,
}

pub struct Environment<C> {
    gripper: GripperController<C>,
    pose: PoseSource,
    task: Task,
    shaping: RewardShaping,
    goal: Goal,
    layout: ObservationLayout,
    episode: EpisodeTracker,
    object_home: i32,
    blindable: bool,
    detection_attempts: u32,
    rng: StdRng,
}

impl<C: ServoChannel> Environment<C> {
    pub fn new(gripper: GripperController<C>, pose: PoseSource, config: &SystemConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let task = Task::from_config(&config.environment);
        let goal = task.choose_goal(&mut rng, None);
        let layout = ObservationLayout {
            joints: gripper.num_motors(),
            velocities: gripper.action_type() == ActionType::Velocity,
            fingertips: if pose.kind() == PoseSourceKind::Fiducial {
                config.object.fingertip_marker_ids.len()
            } else {
                0
            },
            object_position: pose.kind() == PoseSourceKind::Fiducial,
            goal_dims: goal.dims(),
        };
        Self {
            gripper,
            pose,
            task,
            shaping: RewardShaping {
                tolerance: config.environment.noise_tolerance,
                bonus: config.environment.goal_bonus,
                noise_band: config.environment.noise_band,
            },
            goal,
            layout,
            episode: EpisodeTracker::new(),
            object_home: config.object.home_step,
            blindable: config.object.blindable,
            detection_attempts: config.object.detection_attempts,
            rng,
        }
    }

    // ── Accessors ──

    pub fn goal(&self) -> Goal {
        self.goal
    }

    pub fn state(&self) -> EpisodeState {
        self.episode.state()
    }

    pub fn episode(&self) -> &EpisodeTracker {
        &self.episode
    }

    pub fn observation_size(&self) -> usize {
        self.layout.len()
    }

    pub fn num_motors(&self) -> usize {
        self.gripper.num_motors()
    }

    pub fn action_type(&self) -> ActionType {
        self.gripper.action_type()
    }

    pub fn gripper(&self) -> &GripperController<C> {
        &self.gripper
    }

    pub fn gripper_mut(&mut self) -> &mut GripperController<C> {
        &mut self.gripper
    }

    pub fn pose_source_mut(&mut self) -> &mut PoseSource {
        &mut self.pose
    }

    // ── Lifecycle ──

    pub fn setup(&mut self) -> Result<(), EnvironmentError> {
        Ok(self.gripper.setup()?)
    }

    /// Home the gripper, decorrelate the object, draw a fresh goal, and
    /// return the first observation of a new episode.
    pub fn reset(&mut self) -> Result<Vec<f64>, EnvironmentError> {
        let gripper_id = self.gripper.gripper_id();
        self.gripper.home()?;
        self.pose
            .reset()
            .map_err(|e| EnvironmentError::pose(gripper_id, "Failed to reset object", e))?;
        self.goal = self.task.choose_goal(&mut self.rng, Some(&self.goal));
        info!("Gripper#{gripper_id}: new goal {:?}", self.goal);

        let reading = self.sense()?;
        let observation = self.observe(&reading)?;
        self.transition(EpisodeState::EpisodeActive)?;
        Ok(observation)
    }

    /// Apply one action (steps in position mode, speeds in velocity mode).
    pub fn step(&mut self, action: &[i32]) -> Result<StepOutcome, EnvironmentError> {
        if self.episode.state() != EpisodeState::EpisodeActive {
            return Err(EnvironmentError::NotActive(self.episode.state()));
        }
        if action.len() != self.gripper.num_motors() {
            return Err(EnvironmentError::InvalidAction {
                expected: self.gripper.num_motors(),
                got: action.len(),
            });
        }

        let before = self.sense()?;
        match self.gripper.action_type() {
            ActionType::Position => self.gripper.move_to(action)?,
            ActionType::Velocity => self.gripper.move_velocity(action)?,
        }
        let after = self.sense()?;
        self.episode.record_step();

        let (reward, done) = self.task.reward(&self.goal, &before, &after, &self.shaping);
        if before.yaw.is_none() || after.yaw.is_none() {
            info!("Object pose unavailable, ending episode with zero reward");
        }
        debug!("Pose {:?} -> {:?} goal {:?}: reward {reward:.2}", before.yaw, after.yaw, self.goal);

        let observation = self.observe(&after)?;
        if done {
            self.transition(EpisodeState::Terminated)?;
        }
        Ok(StepOutcome {
            observation,
            reward,
            done,
            truncated: false,
        })
    }

    /// End the active episode on behalf of an external time limit.
    pub fn truncate(&mut self) -> Result<(), EnvironmentError> {
        self.transition(EpisodeState::Truncated)
    }

    /// Home-and-resume: home the gripper, return the target to its home,
    /// and produce an observation to continue from.  The episode state is
    /// left untouched.
    pub fn recover(&mut self) -> Result<Vec<f64>, EnvironmentError> {
        let gripper_id = self.gripper.gripper_id();
        info!("Gripper#{gripper_id}: attempting home-and-resume recovery");
        self.gripper.home()?;
        self.pose.reset_target(gripper_id, self.object_home)?;
        let reading = self.sense()?;
        self.observe(&reading)
    }

    /// Draw a new goal mid-episode (sub-goal curricula).
    pub fn resample_goal(&mut self) -> Goal {
        self.goal = self.task.choose_goal(&mut self.rng, Some(&self.goal));
        debug!("Goal resampled to {:?}", self.goal);
        self.goal
    }

    /// Release every joint.  Best-effort.
    pub fn close(&mut self) -> Result<(), EnvironmentError> {
        Ok(self.gripper.close()?)
    }

    // ── Internals ──

    fn sense(&mut self) -> Result<PoseReading, EnvironmentError> {
        let gripper_id = self.gripper.gripper_id();
        self.pose
            .sample(self.blindable, self.detection_attempts)
            .map_err(|e| EnvironmentError::pose(gripper_id, "Failed to read object pose", e))
    }

    fn observe(&mut self, reading: &PoseReading) -> Result<Vec<f64>, EnvironmentError> {
        let positions = self.gripper.positions()?;
        let velocities = if self.layout.velocities {
            self.gripper.velocities()?
        } else {
            Vec::new()
        };
        Ok(self.layout.build(&positions, &velocities, reading, &self.goal))
    }

    fn transition(&mut self, to: EpisodeState) -> Result<(), EnvironmentError> {
        self.episode
            .transition(to)
            .map_err(|t| EnvironmentError::NotActive(t.from))
    }
}
