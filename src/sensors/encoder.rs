//! Indicator-servo pose: the object is mounted on a dedicated servo whose
//! encoder reports its yaw.
//!
//! The servo sits on its own bus (separate from the gripper's), owned here
//! for the process lifetime.  Between episodes the indicator is driven to a
//! random step and released so training starts are decorrelated.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::app::ports::ServoChannel;
use crate::drivers::servo::unit::ServoUnit;
use crate::error::PoseError;

pub struct ServoEncoderPose {
    bus: Box<dyn ServoChannel>,
    servo: ServoUnit,
    rng: StdRng,
    motion_poll_budget: u32,
}

impl ServoEncoderPose {
    pub fn new(bus: Box<dyn ServoChannel>, servo: ServoUnit, seed: u64, motion_poll_budget: u32) -> Self {
        Self {
            bus,
            servo,
            rng: StdRng::seed_from_u64(seed),
            motion_poll_budget,
        }
    }

    pub fn servo(&self) -> &ServoUnit {
        &self.servo
    }

    /// One encoder read, converted through the step↔angle map.
    pub fn get_yaw(&mut self) -> Result<f64, PoseError> {
        Ok(self.servo.current_angle(self.bus.as_mut())?)
    }

    pub fn reset(&mut self) -> Result<(), PoseError> {
        let step = self
            .rng
            .gen_range(self.servo.min_step()..=self.servo.max_step());
        debug!("Indicator Dynamixel#{} reset to random step {step}", self.servo.motor_id());
        self.drive_and_release(step)
    }

    pub fn reset_target(&mut self, home: i32) -> Result<(), PoseError> {
        info!("Resetting Servo #{} to position: {home}", self.servo.motor_id());
        self.drive_and_release(home)
    }

    fn drive_and_release(&mut self, step: i32) -> Result<(), PoseError> {
        let bus = self.bus.as_mut();
        self.servo.enable_torque(bus)?;
        self.servo.move_to(bus, step)?;
        self.servo.wait_until_stopped(bus, self.motion_poll_budget)?;
        self.servo.disable_torque(bus)?;
        Ok(())
    }
}
