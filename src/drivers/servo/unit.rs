//! ServoUnit: domain operations on one servo.
//!
//! A unit does not own its bus.  Callers pass the [`ServoChannel`] in, so
//! several units on one physical bus are driven through a single exclusive
//! handle owned by the gripper (or pose source).
//!
//! Bounds are enforced before transmission: an out-of-range target never
//! reaches the wire.  Transaction failures are returned as-is; retry policy
//! belongs to the caller.

use log::{debug, info};

use super::registers::{Register, RegisterTable, VelocityEncoding};
use crate::app::ports::ServoChannel;
use crate::config::JointConfig;
use crate::error::ServoError;

const FULL_TURN: f64 = 360.0;

#[derive(Debug, Clone)]
pub struct ServoUnit {
    motor_id: u8,
    min_step: i32,
    max_step: i32,
    led_color: u8,
    torque_limit: u16,
    speed_limit: u16,
    table: &'static RegisterTable,
    /// Last torque state written successfully; `None` when unknown.
    torque_enabled: Option<bool>,
}

impl ServoUnit {
    pub fn new(motor_id: u8, min_step: i32, max_step: i32, table: &'static RegisterTable) -> Self {
        Self {
            motor_id,
            min_step,
            max_step,
            led_color: 0,
            torque_limit: 0,
            speed_limit: 0,
            table,
            torque_enabled: None,
        }
    }

    pub fn from_config(joint: &JointConfig, table: &'static RegisterTable) -> Self {
        Self::new(joint.id, joint.min_step, joint.max_step, table).with_limits(
            joint.led_color,
            joint.torque_limit,
            joint.speed_limit,
        )
    }

    pub fn with_limits(mut self, led_color: u8, torque_limit: u16, speed_limit: u16) -> Self {
        self.led_color = led_color;
        self.torque_limit = torque_limit;
        self.speed_limit = speed_limit;
        self
    }

    pub fn motor_id(&self) -> u8 {
        self.motor_id
    }

    pub fn min_step(&self) -> i32 {
        self.min_step
    }

    pub fn max_step(&self) -> i32 {
        self.max_step
    }

    pub fn speed_limit(&self) -> u16 {
        self.speed_limit
    }

    pub fn model(&self) -> &'static str {
        self.table.model
    }

    // ── Bounds and conversions ──

    pub fn verify_step(&self, step: i32) -> bool {
        self.min_step <= step && step <= self.max_step
    }

    fn check_step(&self, step: i32) -> Result<(), ServoError> {
        if self.verify_step(step) {
            Ok(())
        } else {
            Err(ServoError::OutOfRange {
                motor_id: self.motor_id,
                step,
                min: self.min_step,
                max: self.max_step,
            })
        }
    }

    fn span(&self) -> f64 {
        f64::from(self.max_step - self.min_step)
    }

    /// `angle = step / (max - min) * 360`, wrapped into `[0, 360)`.
    pub fn step_to_angle(&self, step: i32) -> f64 {
        let angle = (f64::from(step) / self.span() * FULL_TURN).rem_euclid(FULL_TURN);
        // rem_euclid can round up to exactly 360 for tiny negatives.
        if angle >= FULL_TURN { 0.0 } else { angle }
    }

    pub fn angle_to_step(&self, angle: f64) -> i32 {
        (angle.rem_euclid(FULL_TURN) / FULL_TURN * self.span()).round() as i32
    }

    // ── Configuration writes ──

    pub fn turn_on_led<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<(), ServoError> {
        self.write(bus, Register::Led, u32::from(self.led_color))?;
        info!("Dynamixel#{} LED on", self.motor_id);
        Ok(())
    }

    pub fn limit_torque<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<(), ServoError> {
        self.write(bus, Register::TorqueLimit, u32::from(self.torque_limit))?;
        info!("Dynamixel#{} torque limited to {}", self.motor_id, self.torque_limit);
        Ok(())
    }

    pub fn limit_speed<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<(), ServoError> {
        self.write(bus, Register::MovingSpeed, u32::from(self.speed_limit))?;
        info!("Dynamixel#{} speed limited to {}", self.motor_id, self.speed_limit);
        Ok(())
    }

    /// No-op when torque is already known to be on.
    pub fn enable_torque<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<(), ServoError> {
        self.set_torque(bus, true)
    }

    /// No-op when torque is already known to be off.
    pub fn disable_torque<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<(), ServoError> {
        self.set_torque(bus, false)
    }

    pub fn torque_enabled(&self) -> Option<bool> {
        self.torque_enabled
    }

    fn set_torque<C: ServoChannel + ?Sized>(&mut self, bus: &mut C, on: bool) -> Result<(), ServoError> {
        if self.torque_enabled == Some(on) {
            return Ok(());
        }
        // A failed write leaves the servo's state unknown.
        self.torque_enabled = None;
        self.write(bus, Register::TorqueEnable, u32::from(on))?;
        self.torque_enabled = Some(on);
        debug!(
            "Dynamixel#{} torque {}",
            self.motor_id,
            if on { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    // ── Motion ──

    /// Command a goal position.  Rejected without transmitting when out of
    /// bounds.
    pub fn move_to<C: ServoChannel + ?Sized>(&mut self, bus: &mut C, step: i32) -> Result<(), ServoError> {
        self.check_step(step)?;
        self.write(bus, Register::GoalPosition, step as u32)
    }

    /// Drive toward the travel limit in the direction of `speed`, at `|speed|`.
    ///
    /// Zero holds the current position.  `|speed|` above the configured
    /// speed limit is rejected without transmitting.
    pub fn move_velocity<C: ServoChannel + ?Sized>(
        &mut self,
        bus: &mut C,
        speed: i32,
    ) -> Result<(), ServoError> {
        let limit = i32::from(self.speed_limit);
        if speed.abs() > limit {
            return Err(ServoError::OutOfRange {
                motor_id: self.motor_id,
                step: speed,
                min: -limit,
                max: limit,
            });
        }
        if speed == 0 {
            let here = self.current_position(bus)?.clamp(self.min_step, self.max_step);
            return self.write(bus, Register::GoalPosition, here as u32);
        }
        let target = if speed > 0 { self.max_step } else { self.min_step };
        self.write(bus, Register::MovingSpeed, speed.unsigned_abs())?;
        self.write(bus, Register::GoalPosition, target as u32)
    }

    pub fn is_moving<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<bool, ServoError> {
        Ok(self.read(bus, Register::Moving)? != 0)
    }

    /// Poll the moving flag until it clears.
    ///
    /// A physical motion already issued cannot be aborted; this only bounds
    /// how long the caller waits for it.
    pub fn wait_until_stopped<C: ServoChannel + ?Sized>(
        &mut self,
        bus: &mut C,
        max_polls: u32,
    ) -> Result<(), ServoError> {
        for _ in 0..max_polls {
            if !self.is_moving(bus)? {
                return Ok(());
            }
        }
        Err(ServoError::MotionTimeout {
            motor_id: self.motor_id,
            polls: max_polls,
        })
    }

    // ── Status ──

    pub fn current_position<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<i32, ServoError> {
        let raw = self.read(bus, Register::PresentPosition)?;
        Ok(raw as i32)
    }

    pub fn current_angle<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<f64, ServoError> {
        let step = self.current_position(bus)?;
        Ok(self.step_to_angle(step))
    }

    /// Signed velocity in raw units; negative is clockwise.
    pub fn current_velocity<C: ServoChannel + ?Sized>(&mut self, bus: &mut C) -> Result<i32, ServoError> {
        let raw = self.read(bus, Register::PresentVelocity)?;
        Ok(match self.table.velocity_encoding {
            VelocityEncoding::SignMagnitude10 => {
                let magnitude = (raw & 0x3FF) as i32;
                if raw & 0x400 != 0 { -magnitude } else { magnitude }
            }
            VelocityEncoding::TwosComplement => raw as i32,
        })
    }

    fn read<C: ServoChannel + ?Sized>(&self, bus: &mut C, register: Register) -> Result<u32, ServoError> {
        Ok(bus.read(self.motor_id, self.table.entry(register))?)
    }

    fn write<C: ServoChannel + ?Sized>(
        &self,
        bus: &mut C,
        register: Register,
        value: u32,
    ) -> Result<(), ServoError> {
        Ok(bus.write(self.motor_id, self.table.entry(register), value)?)
    }
}
