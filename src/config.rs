//! System configuration parameters
//!
//! The whole configuration surface of the training rig: gripper bus and
//! joints, the object pose source, task/reward shaping, and the training
//! schedule.  Loaded through a [`ConfigPort`](crate::app::ports::ConfigPort)
//! and validated before any hardware is opened.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::drivers::servo::registers::RegisterTable;
use crate::sensors::PoseSourceKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub gripper: GripperConfig,
    pub object: ObjectConfig,
    pub environment: EnvironmentConfig,
    pub training: TrainingConfig,
}

// ── Gripper ──

/// How agent actions are applied to the joints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Absolute goal positions, in steps.
    #[default]
    Position,
    /// Signed joint speeds; the loop is paced to a fixed period.
    Velocity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    pub id: u8,
    pub min_step: i32,
    pub max_step: i32,
    pub home_step: i32,
    pub led_color: u8,
    pub torque_limit: u16,
    /// Moving-speed register value; also the velocity-mode action bound.
    pub speed_limit: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperConfig {
    pub gripper_id: u8,
    pub device_name: String,
    pub baudrate: u32,
    /// Selects the register table, e.g. `"XL-320"`.
    pub model: String,
    pub action_type: ActionType,
    pub joints: Vec<JointConfig>,
    /// Moving-flag polls per joint before a motion is declared stalled.
    pub motion_poll_budget: u32,
    /// Serial read timeout for one status packet.
    pub read_timeout_ms: u64,
}

impl Default for GripperConfig {
    fn default() -> Self {
        // Three fingers, three joints each: base, middle, tip.
        let homes = [512, 250, 750, 512, 250, 750, 512, 250, 750];
        let joints = homes
            .iter()
            .zip(1u8..)
            .map(|(&home_step, id)| JointConfig {
                id,
                min_step: 0,
                max_step: 1023,
                home_step,
                led_color: 2,
                torque_limit: 180,
                speed_limit: 100,
            })
            .collect();
        Self {
            gripper_id: 0,
            device_name: "/dev/ttyUSB0".into(),
            baudrate: 57_600,
            model: "XL-320".into(),
            action_type: ActionType::Position,
            joints,
            motion_poll_budget: 200,
            read_timeout_ms: 100,
        }
    }
}

// ── Object pose source ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    pub source: PoseSourceKind,

    // Serial link shared by the encoder servo and magnetic sensor variants.
    pub device_name: String,
    pub baudrate: u32,
    pub read_timeout_ms: u64,

    // Encoder variant.
    pub model: String,
    pub servo_id: u8,
    pub min_step: i32,
    pub max_step: i32,
    pub home_step: i32,

    // Fiducial variant.
    pub marker_id: u32,
    /// Extra markers whose XY feeds the observation (fingertips).
    pub fingertip_marker_ids: Vec<u32>,

    /// Attempt budget for a blindable read, and for the magnetic sensor's
    /// command/response exchange.
    pub detection_attempts: u32,
    /// Whether a missing reading is acceptable (target may leave view).
    pub blindable: bool,

    /// Magnetic variant: reference yaw sent as `OFFSET` when opening.
    pub calibration_yaw: Option<f64>,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            source: PoseSourceKind::Encoder,
            device_name: "/dev/ttyUSB1".into(),
            baudrate: 57_600,
            read_timeout_ms: 100,
            model: "XL330-M077-T".into(),
            servo_id: 10,
            min_step: 0,
            max_step: 4095,
            home_step: 0,
            marker_id: 0,
            fingertip_marker_ids: Vec::new(),
            detection_attempts: 10,
            blindable: true,
            calibration_yaw: None,
        }
    }
}

// ── Task and reward ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Turn the object to a target yaw.
    #[default]
    Rotation,
    /// Push the object to a target XY position.
    Translation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub task: TaskKind,
    /// Distance to goal (degrees or mm) at which the episode succeeds.
    pub noise_tolerance: f64,
    /// Reward paid on reaching the goal.
    pub goal_bonus: f64,
    /// Rotation only: progress deltas within ±band earn nothing.
    pub noise_band: f64,
    /// Rotation goal candidates in degrees.
    pub rotation_goals: Vec<f64>,
    /// Translation goal rectangle, mm relative to the reference marker.
    pub goal_min: [f64; 2],
    pub goal_max: [f64; 2],
    /// Control period, honoured in velocity mode.
    pub step_time_period_ms: u64,
    /// Truncate episodes after this many steps.  `None` = never.
    pub episode_horizon: Option<u32>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            task: TaskKind::Rotation,
            noise_tolerance: 3.0,
            goal_bonus: 500.0,
            noise_band: 3.0,
            rotation_goals: vec![0.0, 90.0, 180.0, 270.0],
            goal_min: [-30.0, 60.0],
            goal_max: [120.0, 110.0],
            step_time_period_ms: 100,
            episode_horizon: None,
        }
    }
}

// ── Training schedule ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub max_steps_training: u64,
    pub max_steps_exploration: u64,
    pub steps_per_train: u64,
    /// Gradient steps per training round.
    pub gradient_steps: u32,
    pub batch_size: usize,
    pub steps_per_evaluation: u64,
    pub eval_episodes: u32,
    pub noise_scale: f64,
    /// Multiplicative decay applied every policy step.
    pub noise_decay: f64,
    pub min_noise: f64,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_steps_training: 10_000,
            max_steps_exploration: 1_000,
            steps_per_train: 1,
            gradient_steps: 1,
            batch_size: 32,
            steps_per_evaluation: 1_000,
            eval_episodes: 5,
            noise_scale: 0.1,
            noise_decay: 1.0,
            min_noise: 0.0,
            seed: None,
        }
    }
}

// ── Validation ──

impl SystemConfig {
    /// Reject inconsistent values.  Nothing is clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gripper.validate()?;
        self.object.validate()?;
        self.environment.validate()?;
        self.training.validate()?;
        if self.environment.task == TaskKind::Translation
            && self.object.source != PoseSourceKind::Fiducial
        {
            return Err(ConfigError::Invalid(
                "translation task requires the fiducial pose source",
            ));
        }
        Ok(())
    }
}

fn ensure(ok: bool, msg: &'static str) -> Result<(), ConfigError> {
    if ok { Ok(()) } else { Err(ConfigError::Invalid(msg)) }
}

impl GripperConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure(!self.joints.is_empty(), "gripper.joints must not be empty")?;
        ensure(
            RegisterTable::for_model(&self.model).is_some(),
            "gripper.model has no register table",
        )?;
        ensure(self.baudrate > 0, "gripper.baudrate must be positive")?;
        ensure(self.motion_poll_budget > 0, "gripper.motion_poll_budget must be at least 1")?;
        ensure(self.read_timeout_ms > 0, "gripper.read_timeout_ms must be positive")?;
        for (i, joint) in self.joints.iter().enumerate() {
            ensure(
                self.joints[..i].iter().all(|j| j.id != joint.id),
                "gripper.joints ids must be unique",
            )?;
            ensure(joint.min_step < joint.max_step, "joint min_step must be below max_step")?;
            ensure(
                (joint.min_step..=joint.max_step).contains(&joint.home_step),
                "joint home_step outside [min_step, max_step]",
            )?;
            if self.action_type == ActionType::Velocity {
                ensure(joint.speed_limit > 0, "joint speed_limit must be positive in velocity mode")?;
            }
        }
        Ok(())
    }
}

impl ObjectConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.detection_attempts > 0, "object.detection_attempts must be at least 1")?;
        match self.source {
            PoseSourceKind::Encoder => {
                ensure(
                    RegisterTable::for_model(&self.model).is_some(),
                    "object.model has no register table",
                )?;
                ensure(self.min_step < self.max_step, "object min_step must be below max_step")?;
                ensure(
                    (self.min_step..=self.max_step).contains(&self.home_step),
                    "object home_step outside [min_step, max_step]",
                )?;
                ensure(self.baudrate > 0, "object.baudrate must be positive")?;
            }
            PoseSourceKind::Magnetic => {
                ensure(self.baudrate > 0, "object.baudrate must be positive")?;
            }
            PoseSourceKind::Fiducial => {
                ensure(
                    !self.fingertip_marker_ids.contains(&self.marker_id),
                    "object.marker_id must differ from fingertip markers",
                )?;
            }
        }
        Ok(())
    }
}

impl EnvironmentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.noise_tolerance > 0.0, "environment.noise_tolerance must be positive")?;
        ensure(self.noise_band >= 0.0, "environment.noise_band must not be negative")?;
        ensure(self.step_time_period_ms > 0, "environment.step_time_period_ms must be positive")?;
        ensure(self.episode_horizon != Some(0), "environment.episode_horizon must be at least 1")?;
        match self.task {
            TaskKind::Rotation => ensure(
                !self.rotation_goals.is_empty(),
                "environment.rotation_goals must not be empty",
            ),
            TaskKind::Translation => ensure(
                self.goal_min[0] < self.goal_max[0] && self.goal_min[1] < self.goal_max[1],
                "environment.goal_min must be below goal_max",
            ),
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.batch_size > 0, "training.batch_size must be positive")?;
        ensure(self.steps_per_train > 0, "training.steps_per_train must be positive")?;
        ensure(self.steps_per_evaluation > 0, "training.steps_per_evaluation must be positive")?;
        ensure(
            self.noise_decay > 0.0 && self.noise_decay <= 1.0,
            "training.noise_decay must be in (0, 1]",
        )?;
        ensure(self.min_noise >= 0.0, "training.min_noise must not be negative")?;
        ensure(self.min_noise <= self.noise_scale, "training.min_noise above noise_scale")?;
        Ok(())
    }
}
