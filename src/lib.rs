//! Gripper training library.
//!
//! Exposes the control loop (servo stack, pose sensing, environment,
//! orchestrator) for the `gripper-train` binary, integration tests and
//! library users who bring their own learning agent.  All hardware is
//! reached through the port traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod control;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod pacing;
pub mod recovery;
pub mod schedule;

pub mod adapters;
pub mod drivers;
pub mod sensors;
