//! Action-space handling between the agent and the joints.

pub mod action;
