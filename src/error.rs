//! Error taxonomy for the gripper control stack.
//!
//! Each layer owns its own error kind and converts the layer below through an
//! explicit mapping function that attaches context (which joint, which
//! operation, which gripper).  Nothing is re-wrapped implicitly.
//!
//! ```text
//!  CommError ──┐
//!              ├─▶ ServoError ──▶ GripperError ──┐
//!  OutOfRange ─┘        │                        ├─▶ EnvironmentError ──▶ FaultRecord
//!                       └──▶ PoseError ──────────┘
//! ```
//!
//! [`FaultRecord`] is the flattened, persistable summary the orchestrator
//! uses to decide between recovery and shutdown.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::ports::{ConfigError, StorageError};
use crate::drivers::servo::registers::Register;
use crate::env::episode::EpisodeState;
use crate::sensors::PoseSourceKind;

// ---------------------------------------------------------------------------
// Bus transactions
// ---------------------------------------------------------------------------

/// Why a single bus transaction failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommFailure {
    #[error("no status packet before timeout")]
    Timeout,
    /// The servo answered with a non-zero error byte.
    #[error("servo returned error 0x{0:02x}")]
    Nack(u8),
    #[error("status packet checksum mismatch")]
    Checksum,
    #[error("malformed status packet")]
    Malformed,
    #[error("status packet from id {got}, expected {expected}")]
    WrongResponder { expected: u8, got: u8 },
    #[error("write to read-only register")]
    ReadOnly,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("port unavailable: {0}")]
    PortUnavailable(String),
}

/// A failed register transaction, attributed to one motor and register.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Dynamixel#{motor_id} {register}: {reason}")]
pub struct CommError {
    pub motor_id: u8,
    pub register: Register,
    pub reason: CommFailure,
}

impl CommError {
    pub fn new(motor_id: u8, register: Register, reason: CommFailure) -> Self {
        Self {
            motor_id,
            register,
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Servo unit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServoError {
    #[error(transparent)]
    Comm(#[from] CommError),
    /// Rejected before anything was transmitted.
    #[error("Dynamixel#{motor_id}: step {step} outside [{min}, {max}]")]
    OutOfRange {
        motor_id: u8,
        step: i32,
        min: i32,
        max: i32,
    },
    #[error("Dynamixel#{motor_id}: still moving after {polls} polls")]
    MotionTimeout { motor_id: u8, polls: u32 },
}

impl ServoError {
    pub fn motor_id(&self) -> u8 {
        match self {
            Self::Comm(e) => e.motor_id,
            Self::OutOfRange { motor_id, .. } | Self::MotionTimeout { motor_id, .. } => *motor_id,
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }
}

// ---------------------------------------------------------------------------
// Gripper
// ---------------------------------------------------------------------------

/// Multi-joint operation that produced a [`GripperError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperOp {
    Setup,
    Home,
    Move,
    MoveVelocity,
    ReadState,
    Close,
}

impl fmt::Display for GripperOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Home => "home",
            Self::Move => "move",
            Self::MoveVelocity => "move_velocity",
            Self::ReadState => "read_state",
            Self::Close => "close",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointFault {
    pub motor_id: u8,
    pub error: ServoError,
}

/// One value per joint was expected.  Nothing was transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub expected: usize,
    pub got: usize,
}

/// Composite fault: every joint that failed during one gripper operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GripperError {
    pub gripper_id: u8,
    pub operation: GripperOp,
    pub failures: Vec<JointFault>,
    /// Set when the command itself had the wrong arity; `failures` is
    /// then empty.
    pub shape: Option<ShapeMismatch>,
}

impl GripperError {
    /// Map a single joint's failure into the gripper's error kind.
    pub fn from_joint(gripper_id: u8, operation: GripperOp, error: ServoError) -> Self {
        Self {
            gripper_id,
            operation,
            failures: vec![JointFault {
                motor_id: error.motor_id(),
                error,
            }],
            shape: None,
        }
    }

    pub fn shape_mismatch(gripper_id: u8, operation: GripperOp, expected: usize, got: usize) -> Self {
        Self {
            gripper_id,
            operation,
            failures: Vec::new(),
            shape: Some(ShapeMismatch { expected, got }),
        }
    }

    pub fn is_shape_mismatch(&self) -> bool {
        self.shape.is_some()
    }

    pub fn first_motor(&self) -> Option<u8> {
        self.failures.first().map(|f| f.motor_id)
    }

    pub fn is_out_of_range(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_out_of_range())
    }

    /// True when at least one joint failed on the bus itself.
    pub fn has_comm_failure(&self) -> bool {
        self.failures
            .iter()
            .any(|f| matches!(f.error, ServoError::Comm(_)))
    }
}

impl fmt::Display for GripperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ShapeMismatch { expected, got }) = self.shape {
            return write!(
                f,
                "Gripper#{}: {} expects {expected} joint values, got {got}",
                self.gripper_id, self.operation
            );
        }
        write!(
            f,
            "Gripper#{}: {} failed on {} joint(s)",
            self.gripper_id,
            self.operation,
            self.failures.len()
        )?;
        for fault in &self.failures {
            write!(f, "; {}", fault.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for GripperError {}

// ---------------------------------------------------------------------------
// Pose sensing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoseError {
    /// Indicator servo transaction failed.
    #[error(transparent)]
    Servo(#[from] ServoError),
    /// The bus is healthy but the target could not be observed in budget.
    #[error("{source_kind} pose unavailable after {attempts} attempt(s)")]
    SensingUnavailable {
        source_kind: PoseSourceKind,
        attempts: u32,
    },
    #[error("pose port unavailable: {0}")]
    PortUnavailable(String),
    #[error("pose channel I/O failed: {0}")]
    Io(String),
}

impl PoseError {
    pub fn motor_id(&self) -> Option<u8> {
        match self {
            Self::Servo(e) => Some(e.motor_id()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Gripper(#[from] GripperError),
    #[error("Environment for Gripper#{gripper_id}: {operation}: {source}")]
    Pose {
        gripper_id: u8,
        operation: &'static str,
        source: PoseError,
    },
    #[error("action has {got} joint values, gripper has {expected}")]
    InvalidAction { expected: usize, got: usize },
    #[error("step requested while episode is {0}")]
    NotActive(EpisodeState),
}

impl EnvironmentError {
    /// Attribute a pose fault to the gripper instance that owns the sensor.
    pub fn pose(gripper_id: u8, operation: &'static str, source: PoseError) -> Self {
        Self::Pose {
            gripper_id,
            operation,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Fault records
// ---------------------------------------------------------------------------

/// Layer a fault originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    ServoBus,
    Gripper,
    PoseSource,
    Environment,
    Orchestrator,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServoBus => "servo-bus",
            Self::Gripper => "gripper",
            Self::PoseSource => "pose-source",
            Self::Environment => "environment",
            Self::Orchestrator => "orchestrator",
        })
    }
}

pub const FAULT_MESSAGE_LEN: usize = 128;
pub const FAULT_ACTION_LEN: usize = 16;

/// Flattened fault summary.  Fixed-capacity so it can be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub component: Component,
    pub motor_id: Option<u8>,
    pub message: heapless::String<FAULT_MESSAGE_LEN>,
    pub recoverable: bool,
    pub total_step: u64,
    /// Action in progress when the fault surfaced (truncated).
    pub action: heapless::Vec<i32, FAULT_ACTION_LEN>,
}

impl FaultRecord {
    pub fn new(component: Component, message: &str, recoverable: bool) -> Self {
        Self {
            component,
            motor_id: None,
            message: truncated(message),
            recoverable,
            total_step: 0,
            action: heapless::Vec::new(),
        }
    }

    /// Classify an environment fault.
    ///
    /// Hardware faults are recoverable once; faults caused by the caller
    /// (bad action shape, stepping a finished episode, out-of-range
    /// targets) are not, since a recovery would only repeat them.
    pub fn from_environment(err: &EnvironmentError) -> Self {
        let message = err.to_string();
        let (component, motor_id, recoverable) = match err {
            EnvironmentError::Gripper(g) => {
                let component = if g.has_comm_failure() {
                    Component::ServoBus
                } else {
                    Component::Gripper
                };
                (component, g.first_motor(), !g.is_out_of_range() && !g.is_shape_mismatch())
            }
            EnvironmentError::Pose { source, .. } => {
                let recoverable = !matches!(source, PoseError::Servo(e) if e.is_out_of_range());
                (Component::PoseSource, source.motor_id(), recoverable)
            }
            EnvironmentError::InvalidAction { .. } => (Component::Environment, None, false),
            EnvironmentError::NotActive(_) => (Component::Orchestrator, None, false),
        };
        let mut record = Self::new(component, &message, recoverable);
        record.motor_id = motor_id;
        record
    }

    pub fn at_step(mut self, total_step: u64) -> Self {
        self.total_step = total_step;
        self
    }

    pub fn with_action(mut self, action: &[i32]) -> Self {
        self.action.clear();
        for &a in action.iter().take(FAULT_ACTION_LEN) {
            // Capacity checked by take().
            let _ = self.action.push(a);
        }
        self
    }
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.component)?;
        if let Some(id) = self.motor_id {
            write!(f, " motor={id}")?;
        }
        write!(
            f,
            " step={} recoverable={} action={:?}: {}",
            self.total_step,
            self.recoverable,
            self.action.as_slice(),
            self.message
        )
    }
}

/// Copy `s` into a fixed-capacity string, cutting at a char boundary.
fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TrainingError {
    /// A fault survived its recovery attempt, or could not be recovered.
    #[error("fatal fault {0}")]
    Fatal(FaultRecord),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}
