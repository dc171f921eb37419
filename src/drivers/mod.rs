//! Actuator drivers: the servo register stack and the multi-joint gripper.

pub mod gripper;
pub mod servo;
