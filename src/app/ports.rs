//! Port traits: the hexagonal boundary between the control loop and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Environment / TrainingOrchestrator
//! ```
//!
//! Hardware (byte transports, servo buses, cameras), the learning
//! collaborators (agent, replay memory) and persistence all sit behind these
//! traits.  The domain core consumes them via generics or boxed trait
//! objects, so every layer can run against a simulated backend in tests.
//!
//! Every call here may block.  None of them carries an intrinsic timeout at
//! this layer; budgets are supplied by callers (attempt counts, the serial
//! read timeout, the pacing sleep).

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::config::SystemConfig;
use crate::drivers::servo::registers::RegisterEntry;
use crate::error::CommError;

// ───────────────────────────────────────────────────────────────
// Byte transport (driven adapter: serial tty, simulated line)
// ───────────────────────────────────────────────────────────────

/// Byte-oriented, half-duplex channel.
pub trait Transport {
    /// Read up to `buf.len()` bytes.  Returns 0 when the read timed out
    /// with nothing received.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `data`.  Returns the number of bytes actually accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Flush buffered output to the wire.
    fn flush(&mut self) -> io::Result<()>;

    /// Discard anything received but not yet read (stale replies).
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Write all of `data`, failing on a zero-length write.
pub fn write_all<T: Transport + ?Sized>(transport: &mut T, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match transport.write(data)? {
            0 => return Err(io::Error::new(io::ErrorKind::WriteZero, "transport accepted 0 bytes")),
            n => data = &data[n..],
        }
    }
    transport.flush()
}

// ───────────────────────────────────────────────────────────────
// Servo channel (driven adapter: register bus)
// ───────────────────────────────────────────────────────────────

/// Register-level access to servos on one shared bus.
///
/// Each call is one complete transaction: the full register width is
/// written or read atomically, and a failure is reported without retrying.
pub trait ServoChannel {
    fn read(&mut self, motor_id: u8, entry: RegisterEntry) -> Result<u32, CommError>;

    fn write(&mut self, motor_id: u8, entry: RegisterEntry, value: u32) -> Result<(), CommError>;
}

// ───────────────────────────────────────────────────────────────
// Vision (driven adapter: camera + fiducial detector)
// ───────────────────────────────────────────────────────────────

/// One captured camera frame.  Opaque to the control loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Camera intrinsics handed through to the detector untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraCalibration {
    pub camera_matrix: [[f64; 3]; 3],
    pub distortion: Vec<f64>,
}

/// Marker pose relative to the camera (or reference marker).
///
/// Positions are millimetres, orientation is roll/pitch/yaw in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarkerPose {
    pub position: [f64; 3],
    pub orientation: [f64; 3],
}

impl MarkerPose {
    pub fn yaw(&self) -> f64 {
        self.orientation[2]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("vision provider: {0}")]
pub struct VisionError(pub String);

/// Frame acquisition and marker pose estimation.
pub trait PoseProvider {
    fn grab_frame(&mut self) -> Result<Frame, VisionError>;

    fn get_marker_poses(
        &mut self,
        frame: &Frame,
        calibration: &CameraCalibration,
    ) -> Result<HashMap<u32, MarkerPose>, VisionError>;
}

// ───────────────────────────────────────────────────────────────
// Learning collaborators
// ───────────────────────────────────────────────────────────────

/// How the agent should choose its next action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyMode {
    /// Policy action with additive exploration noise of this scale.
    Explore { noise_scale: f64 },
    /// Deterministic action, used for evaluation.
    Greedy,
}

/// One environment transition, normalised action space.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f64>,
    pub action: Vec<f64>,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub done: bool,
}

/// Free-form training metrics returned by [`Agent::train_policy`].
pub type TrainInfo = BTreeMap<String, f64>;

/// The learning algorithm.  Actions are exchanged in `[-1, 1]` per joint.
pub trait Agent {
    fn select_action(&mut self, state: &[f64], mode: PolicyMode) -> Vec<f64>;

    fn train_policy(&mut self, batch: &[Transition]) -> TrainInfo;

    fn save_models(&mut self, tag: &str, dir: &Path) -> Result<(), StorageError>;

    /// Curiosity-style bonus added to the stored reward.  Zero unless the
    /// algorithm provides one.
    fn intrinsic_reward(&mut self, _state: &[f64], _action: &[f64], _next_state: &[f64]) -> f64 {
        0.0
    }
}

/// Experience storage for off-policy training.
pub trait ReplayMemory {
    fn add(&mut self, transition: Transition);

    fn sample(&mut self, batch_size: usize) -> Vec<Transition>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The orchestrator emits structured
/// [`TrainingEvent`](super::events::TrainingEvent)s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::TrainingEvent);
}

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// Monotonic clock.  The epoch is arbitrary; only differences matter.
pub trait Clock {
    fn now(&self) -> Duration;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the system configuration.
///
/// Implementations MUST validate before persisting; invalid values are
/// rejected with [`ConfigError::Invalid`], never clamped.
pub trait ConfigPort {
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ run directory)
// ───────────────────────────────────────────────────────────────

/// Namespaced key-value blob storage (fault log, run artefacts).
///
/// Writes MUST be atomic: a reader never observes a partial blob.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Stored config could not be parsed.
    #[error("config corrupted: {0}")]
    Corrupted(String),
    /// A field failed validation.  Names the field and the rule.
    #[error("validation failed: {0}")]
    Invalid(&'static str),
    #[error("config I/O: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found")]
    NotFound,
    /// Caller's buffer is smaller than the stored blob.
    #[error("buffer too small: need {0} bytes")]
    BufferTooSmall(usize),
    #[error("invalid key or namespace")]
    InvalidKey,
    #[error("storage I/O: {0}")]
    Io(#[from] io::Error),
    #[error("encoding: {0}")]
    Encoding(String),
}
