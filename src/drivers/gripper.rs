//! GripperController: coordinated multi-joint actuator.
//!
//! Owns the servo bus exclusively and one [`ServoUnit`] per joint.
//! Multi-joint commands are validated as a whole before any joint is
//! touched, then issued joint by joint.  Failures are collected per joint
//! and reported together in one [`GripperError`].
//!
//! ```text
//!   move_to([s1..sn]) ─▶ verify all ─▶ write goal 1..n ─▶ poll `moving` 1..n
//!                          │ any out of range
//!                          └──▶ GripperError (nothing transmitted)
//! ```

use log::{info, warn};

use super::servo::registers::RegisterTable;
use super::servo::unit::ServoUnit;
use crate::app::ports::ServoChannel;
use crate::config::{ActionType, GripperConfig};
use crate::error::{GripperError, GripperOp, JointFault, ServoError};

pub struct GripperController<C> {
    gripper_id: u8,
    bus: C,
    joints: Vec<ServoUnit>,
    home: Vec<i32>,
    action_type: ActionType,
    motion_poll_budget: u32,
}

impl<C: ServoChannel> GripperController<C> {
    /// Returns `None` when the configured model has no register table.
    pub fn new(bus: C, config: &GripperConfig) -> Option<Self> {
        let table = RegisterTable::for_model(&config.model)?;
        Some(Self {
            gripper_id: config.gripper_id,
            bus,
            joints: config
                .joints
                .iter()
                .map(|j| ServoUnit::from_config(j, table))
                .collect(),
            home: config.joints.iter().map(|j| j.home_step).collect(),
            action_type: config.action_type,
            motion_poll_budget: config.motion_poll_budget,
        })
    }

    pub fn gripper_id(&self) -> u8 {
        self.gripper_id
    }

    pub fn num_motors(&self) -> usize {
        self.joints.len()
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    pub fn joints(&self) -> &[ServoUnit] {
        &self.joints
    }

    pub fn home_steps(&self) -> &[i32] {
        &self.home
    }

    pub fn bus_mut(&mut self) -> &mut C {
        &mut self.bus
    }

    // ── Lifecycle ──

    /// LED, torque limit, speed limit and torque enable on every joint.
    pub fn setup(&mut self) -> Result<(), GripperError> {
        let failures = self.for_each_joint(|servo, bus| {
            servo.turn_on_led(bus)?;
            servo.limit_torque(bus)?;
            servo.limit_speed(bus)?;
            servo.enable_torque(bus)
        });
        self.report(GripperOp::Setup, failures)?;
        info!("Gripper#{}: setup complete ({} joints)", self.gripper_id, self.joints.len());
        Ok(())
    }

    /// Return every joint to its configured home step and wait for it.
    pub fn home(&mut self) -> Result<(), GripperError> {
        let home = self.home.clone();
        self.drive_to(GripperOp::Home, &home)?;
        info!("Gripper#{}: homed", self.gripper_id);
        Ok(())
    }

    /// Disable torque everywhere.  Best-effort: every joint is attempted.
    pub fn close(&mut self) -> Result<(), GripperError> {
        let failures = self.for_each_joint(|servo, bus| servo.disable_torque(bus));
        if !failures.is_empty() {
            warn!(
                "Gripper#{}: {} joint(s) did not release torque",
                self.gripper_id,
                failures.len()
            );
        }
        self.report(GripperOp::Close, failures)
    }

    // ── Motion ──

    /// Position action: one goal step per joint.
    pub fn move_to(&mut self, steps: &[i32]) -> Result<(), GripperError> {
        self.drive_to(GripperOp::Move, steps)
    }

    /// Velocity action: one signed speed per joint.  Does not wait.
    pub fn move_velocity(&mut self, speeds: &[i32]) -> Result<(), GripperError> {
        self.check_len(GripperOp::MoveVelocity, speeds.len())?;
        let over: Vec<JointFault> = self
            .joints
            .iter()
            .zip(speeds)
            .filter(|(servo, speed)| speed.unsigned_abs() > u32::from(servo.speed_limit()))
            .map(|(servo, &speed)| JointFault {
                motor_id: servo.motor_id(),
                error: ServoError::OutOfRange {
                    motor_id: servo.motor_id(),
                    step: speed,
                    min: -i32::from(servo.speed_limit()),
                    max: i32::from(servo.speed_limit()),
                },
            })
            .collect();
        self.report(GripperOp::MoveVelocity, over)?;

        let mut failures = Vec::new();
        for (servo, &speed) in self.joints.iter_mut().zip(speeds) {
            if let Err(error) = servo.move_velocity(&mut self.bus, speed) {
                failures.push(JointFault {
                    motor_id: servo.motor_id(),
                    error,
                });
            }
        }
        self.report(GripperOp::MoveVelocity, failures)
    }

    fn drive_to(&mut self, op: GripperOp, steps: &[i32]) -> Result<(), GripperError> {
        self.check_len(op, steps.len())?;
        let out_of_range: Vec<JointFault> = self
            .joints
            .iter()
            .zip(steps)
            .filter(|(servo, step)| !servo.verify_step(**step))
            .map(|(servo, &step)| JointFault {
                motor_id: servo.motor_id(),
                error: ServoError::OutOfRange {
                    motor_id: servo.motor_id(),
                    step,
                    min: servo.min_step(),
                    max: servo.max_step(),
                },
            })
            .collect();
        self.report(op, out_of_range)?;

        let mut failures = Vec::new();
        for (servo, &step) in self.joints.iter_mut().zip(steps) {
            let issued = servo
                .enable_torque(&mut self.bus)
                .and_then(|()| servo.move_to(&mut self.bus, step));
            if let Err(error) = issued {
                failures.push(JointFault {
                    motor_id: servo.motor_id(),
                    error,
                });
            }
        }
        self.report(op, failures)?;

        let budget = self.motion_poll_budget;
        let failures = self.for_each_joint(|servo, bus| servo.wait_until_stopped(bus, budget));
        self.report(op, failures)
    }

    // ── State ──

    pub fn positions(&mut self) -> Result<Vec<i32>, GripperError> {
        self.collect(|servo, bus| servo.current_position(bus))
    }

    pub fn velocities(&mut self) -> Result<Vec<i32>, GripperError> {
        self.collect(|servo, bus| servo.current_velocity(bus))
    }

    // ── Helpers ──

    fn check_len(&self, op: GripperOp, got: usize) -> Result<(), GripperError> {
        if got == self.joints.len() {
            return Ok(());
        }
        let err = GripperError::shape_mismatch(self.gripper_id, op, self.joints.len(), got);
        warn!("{err}");
        Err(err)
    }

    fn for_each_joint<F>(&mut self, mut f: F) -> Vec<JointFault>
    where
        F: FnMut(&mut ServoUnit, &mut C) -> Result<(), ServoError>,
    {
        let mut failures = Vec::new();
        for servo in &mut self.joints {
            if let Err(error) = f(servo, &mut self.bus) {
                failures.push(JointFault {
                    motor_id: servo.motor_id(),
                    error,
                });
            }
        }
        failures
    }

    fn collect<F>(&mut self, mut f: F) -> Result<Vec<i32>, GripperError>
    where
        F: FnMut(&mut ServoUnit, &mut C) -> Result<i32, ServoError>,
    {
        let mut values = Vec::with_capacity(self.joints.len());
        let mut failures = Vec::new();
        for servo in &mut self.joints {
            match f(servo, &mut self.bus) {
                Ok(v) => values.push(v),
                Err(error) => failures.push(JointFault {
                    motor_id: servo.motor_id(),
                    error,
                }),
            }
        }
        self.report(GripperOp::ReadState, failures)?;
        Ok(values)
    }

    fn report(&self, operation: GripperOp, failures: Vec<JointFault>) -> Result<(), GripperError> {
        if failures.is_empty() {
            return Ok(());
        }
        let err = GripperError {
            gripper_id: self.gripper_id,
            operation,
            failures,
            shape: None,
        };
        warn!("{err}");
        Err(err)
    }
}
