//! Application core: orchestration over ports, no direct I/O.
//!
//! The training loop, its outbound events and the collaborator traits live
//! here.  All hardware and persistence is reached through the **port
//! traits** in [`ports`], so the loop runs unchanged against simulated
//! backends.

pub mod events;
pub mod ports;
pub mod trainer;
