//! Mock hardware and collaborators for integration tests.
//!
//! Every mock hands out a cloneable handle over shared state, so a test can
//! move one copy into the system under test and keep another to inject
//! faults and assert on the full transaction history.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use gripper_rl::app::events::TrainingEvent;
use gripper_rl::app::ports::{
    Agent, CameraCalibration, Clock, EventSink, Frame, MarkerPose, PolicyMode, PoseProvider,
    ReplayMemory, ServoChannel, StorageError, StoragePort, TrainInfo, Transition, Transport,
    VisionError,
};
use gripper_rl::config::SystemConfig;
use gripper_rl::drivers::gripper::GripperController;
use gripper_rl::drivers::servo::registers::{Register, RegisterEntry, XL330};
use gripper_rl::drivers::servo::unit::ServoUnit;
use gripper_rl::env::Environment;
use gripper_rl::error::{CommError, CommFailure};
use gripper_rl::sensors::PoseSource;
use gripper_rl::sensors::encoder::ServoEncoderPose;

// ── Servo bus ─────────────────────────────────────────────────

struct InjectedFault {
    motor_id: u8,
    register: Register,
    /// Accesses let through before the fault starts.
    skip: u32,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Default)]
pub struct BusState {
    registers: HashMap<(u8, Register), u32>,
    scripted_reads: HashMap<(u8, Register), VecDeque<u32>>,
    faults: Vec<InjectedFault>,
    pub transactions: u64,
    pub writes: Vec<(u8, Register, u32)>,
}

impl BusState {
    fn take_fault(&mut self, motor_id: u8, register: Register) -> bool {
        let Some(fault) = self
            .faults
            .iter_mut()
            .find(|f| f.motor_id == motor_id && f.register == register && f.remaining != Some(0))
        else {
            return false;
        };
        if fault.skip > 0 {
            fault.skip -= 1;
            return false;
        }
        if let Some(n) = fault.remaining.as_mut() {
            *n -= 1;
        }
        true
    }
}

/// Register-level servo bus.  Goal-position writes arrive instantly and
/// every servo reports "not moving".
#[derive(Clone, Default)]
pub struct MockBus(Rc<RefCell<BusState>>);

#[allow(dead_code)]
impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, motor_id: u8, register: Register, value: u32) {
        self.0.borrow_mut().registers.insert((motor_id, register), value);
    }

    pub fn get(&self, motor_id: u8, register: Register) -> Option<u32> {
        self.0.borrow().registers.get(&(motor_id, register)).copied()
    }

    /// Values returned by the next reads of one register, before falling
    /// back to the stored value.
    pub fn script_reads(&self, motor_id: u8, register: Register, values: &[u32]) {
        self.0
            .borrow_mut()
            .scripted_reads
            .entry((motor_id, register))
            .or_default()
            .extend(values.iter().copied());
    }

    /// Fail the next `times` accesses (`None`: all) with a timeout.
    pub fn fail(&self, motor_id: u8, register: Register, times: Option<u32>) {
        self.fail_after(motor_id, register, 0, times);
    }

    /// Like [`fail`](Self::fail), but only after `skip` good accesses.
    pub fn fail_after(&self, motor_id: u8, register: Register, skip: u32, times: Option<u32>) {
        self.0.borrow_mut().faults.push(InjectedFault {
            motor_id,
            register,
            skip,
            remaining: times,
        });
    }

    pub fn clear_faults(&self) {
        self.0.borrow_mut().faults.clear();
    }

    pub fn transactions(&self) -> u64 {
        self.0.borrow().transactions
    }

    pub fn writes_to(&self, register: Register) -> Vec<(u8, u32)> {
        self.0
            .borrow()
            .writes
            .iter()
            .filter(|(_, r, _)| *r == register)
            .map(|&(id, _, v)| (id, v))
            .collect()
    }
}

impl ServoChannel for MockBus {
    fn read(&mut self, motor_id: u8, entry: RegisterEntry) -> Result<u32, CommError> {
        let mut state = self.0.borrow_mut();
        state.transactions += 1;
        if state.take_fault(motor_id, entry.register) {
            return Err(CommError::new(motor_id, entry.register, CommFailure::Timeout));
        }
        let key = (motor_id, entry.register);
        if let Some(v) = state.scripted_reads.get_mut(&key).and_then(VecDeque::pop_front) {
            return Ok(v);
        }
        Ok(state.registers.get(&key).copied().unwrap_or(0))
    }

    fn write(&mut self, motor_id: u8, entry: RegisterEntry, value: u32) -> Result<(), CommError> {
        let mut state = self.0.borrow_mut();
        state.transactions += 1;
        if state.take_fault(motor_id, entry.register) {
            return Err(CommError::new(motor_id, entry.register, CommFailure::Timeout));
        }
        state.registers.insert((motor_id, entry.register), value);
        if entry.register == Register::GoalPosition {
            state.registers.insert((motor_id, Register::PresentPosition), value);
        }
        state.writes.push((motor_id, entry.register, value));
        Ok(())
    }
}

// ── Vision ────────────────────────────────────────────────────

#[derive(Default)]
pub struct PoseScript {
    frames: VecDeque<Result<HashMap<u32, MarkerPose>, VisionError>>,
    pub grabs: u32,
}

/// Pose provider replaying scripted detections; empty once exhausted.
#[derive(Clone, Default)]
pub struct ScriptedPoses(Rc<RefCell<PoseScript>>);

#[allow(dead_code)]
impl ScriptedPoses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_marker(&self, marker_id: u32, position: [f64; 3], yaw: f64) {
        let pose = MarkerPose {
            position,
            orientation: [0.0, 0.0, yaw],
        };
        self.0
            .borrow_mut()
            .frames
            .push_back(Ok(HashMap::from([(marker_id, pose)])));
    }

    pub fn push_poses(&self, poses: HashMap<u32, MarkerPose>) {
        self.0.borrow_mut().frames.push_back(Ok(poses));
    }

    pub fn push_empty(&self, count: usize) {
        for _ in 0..count {
            self.0.borrow_mut().frames.push_back(Ok(HashMap::new()));
        }
    }

    pub fn push_error(&self, message: &str) {
        self.0
            .borrow_mut()
            .frames
            .push_back(Err(VisionError(message.into())));
    }

    pub fn grabs(&self) -> u32 {
        self.0.borrow().grabs
    }
}

impl PoseProvider for ScriptedPoses {
    fn grab_frame(&mut self) -> Result<Frame, VisionError> {
        self.0.borrow_mut().grabs += 1;
        Ok(Frame::default())
    }

    fn get_marker_poses(
        &mut self,
        _frame: &Frame,
        _calibration: &CameraCalibration,
    ) -> Result<HashMap<u32, MarkerPose>, VisionError> {
        self.0
            .borrow_mut()
            .frames
            .pop_front()
            .unwrap_or_else(|| Ok(HashMap::new()))
    }
}

// ── Serial line ───────────────────────────────────────────────

#[derive(Default)]
pub struct LineState {
    replies: VecDeque<Vec<u8>>,
    readable: VecDeque<u8>,
    pub written: Vec<u8>,
}

/// Half-duplex line: each newline written releases the next scripted reply.
/// With no reply queued, reads time out (return 0).
#[derive(Clone, Default)]
pub struct ScriptedLine(Rc<RefCell<LineState>>);

#[allow(dead_code)]
impl ScriptedLine {
    pub fn new(replies: &[&[u8]]) -> Self {
        let line = Self::default();
        line.0
            .borrow_mut()
            .replies
            .extend(replies.iter().map(|r| r.to_vec()));
        line
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow().written).into_owned()
    }
}

impl Transport for ScriptedLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        let n = buf.len().min(state.readable.len());
        for (slot, byte) in buf.iter_mut().zip(state.readable.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        state.written.extend_from_slice(data);
        for _ in data.iter().filter(|&&b| b == b'\n') {
            if let Some(reply) = state.replies.pop_front() {
                state.readable.extend(reply);
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.0.borrow_mut().readable.clear();
        Ok(())
    }
}

// ── Learning collaborators ────────────────────────────────────

/// Agent returning a fixed normalised action and recording every call.
pub struct RecordingAgent {
    pub action: Vec<f64>,
    pub modes: Vec<PolicyMode>,
    pub train_calls: usize,
    pub saved: Vec<String>,
    pub intrinsic: f64,
}

#[allow(dead_code)]
impl RecordingAgent {
    pub fn new(action_dims: usize) -> Self {
        Self {
            action: vec![0.0; action_dims],
            modes: Vec::new(),
            train_calls: 0,
            saved: Vec::new(),
            intrinsic: 0.0,
        }
    }
}

impl Agent for RecordingAgent {
    fn select_action(&mut self, _state: &[f64], mode: PolicyMode) -> Vec<f64> {
        self.modes.push(mode);
        self.action.clone()
    }

    fn train_policy(&mut self, batch: &[Transition]) -> TrainInfo {
        self.train_calls += 1;
        TrainInfo::from([("batch".to_string(), batch.len() as f64)])
    }

    fn save_models(&mut self, tag: &str, _dir: &Path) -> Result<(), StorageError> {
        self.saved.push(tag.to_string());
        Ok(())
    }

    fn intrinsic_reward(&mut self, _state: &[f64], _action: &[f64], _next: &[f64]) -> f64 {
        self.intrinsic
    }
}

#[derive(Default)]
pub struct VecMemory {
    pub transitions: Vec<Transition>,
}

impl ReplayMemory for VecMemory {
    fn add(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    fn sample(&mut self, batch_size: usize) -> Vec<Transition> {
        self.transitions.iter().rev().take(batch_size).cloned().collect()
    }

    fn len(&self) -> usize {
        self.transitions.len()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<TrainingEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&TrainingEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &TrainingEvent) {
        self.events.push(event.clone());
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStorage {
    data: HashMap<String, Vec<u8>>,
}

impl MemStorage {
    fn key(ns: &str, key: &str) -> String {
        format!("{ns}::{key}")
    }
}

impl StoragePort for MemStorage {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.data.get(&Self::key(ns, key)).ok_or(StorageError::NotFound)?;
        if data.len() > buf.len() {
            return Err(StorageError::BufferTooSmall(data.len()));
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.data.insert(Self::key(ns, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.data.remove(&Self::key(ns, key));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.data.contains_key(&Self::key(ns, key))
    }
}

// ── Time ──────────────────────────────────────────────────────

/// Simulated time: only the delay advances the clock.
#[derive(Clone, Default)]
pub struct SimTime(Rc<Cell<u64>>);

#[allow(dead_code)]
impl SimTime {
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.0.get())
    }
}

impl Clock for SimTime {
    fn now(&self) -> Duration {
        self.elapsed()
    }
}

impl DelayNs for SimTime {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + u64::from(ns));
    }
}

// ── Builders ──────────────────────────────────────────────────

pub const OBJECT_SERVO: u8 = 10;

/// Three-joint gripper, rotation task towards 90° only, small budgets.
pub fn small_config() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.gripper.joints.truncate(3);
    config.gripper.motion_poll_budget = 5;
    config.environment.rotation_goals = vec![90.0];
    config.environment.noise_tolerance = 3.0;
    config.environment.goal_bonus = 500.0;
    config.training.max_steps_training = 6;
    config.training.max_steps_exploration = 3;
    config.training.batch_size = 2;
    config.training.steps_per_evaluation = 1000;
    config.training.eval_episodes = 2;
    config
}

/// XL330 step that reads back as (approximately) `angle` degrees.
#[allow(dead_code)]
pub fn object_step(angle: f64) -> u32 {
    (angle / 360.0 * 4095.0).round() as u32
}

pub fn encoder_pose(object_bus: &MockBus, seed: u64) -> PoseSource {
    let servo = ServoUnit::new(OBJECT_SERVO, 0, 4095, &XL330);
    PoseSource::Encoder(ServoEncoderPose::new(Box::new(object_bus.clone()), servo, seed, 5))
}

pub fn make_env(config: &SystemConfig, gripper_bus: &MockBus, pose: PoseSource) -> Environment<MockBus> {
    let gripper = GripperController::new(gripper_bus.clone(), &config.gripper)
        .expect("gripper config has joints");
    Environment::new(gripper, pose, config, 7)
}
