//! Episode lifecycle state machine.
//!
//! ```text
//!            reset                 goal reached
//!   Idle ───────────▶ EpisodeActive ─────────────▶ Terminated
//!                      ▲    │   │                      │
//!                      │    │   └──── truncate ──▶ Truncated
//!                      │    │                          │
//!                      └────┴──────── reset ◀──────────┘
//! ```
//!
//! Transitions are table-driven: [`ALLOWED`] is indexed by
//! `[from as usize][to as usize]`.  `Truncated` is only ever entered from
//! outside (a time limit policy); the environment's own logic never
//! truncates.

use core::fmt;

use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EpisodeState {
    Idle = 0,
    EpisodeActive = 1,
    Terminated = 2,
    Truncated = 3,
}

impl EpisodeState {
    pub const COUNT: usize = 4;

    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::EpisodeActive => "EpisodeActive",
            Self::Terminated => "Terminated",
            Self::Truncated => "Truncated",
        }
    }

    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Terminated | Self::Truncated)
    }
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `ALLOWED[from][to]`.
const ALLOWED: [[bool; EpisodeState::COUNT]; EpisodeState::COUNT] = [
    //  Idle   Active Term   Trunc
    [false, true, false, false], // Idle
    [false, true, true, true],   // EpisodeActive (re-reset allowed)
    [false, true, false, false], // Terminated
    [false, true, false, false], // Truncated
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: EpisodeState,
    pub to: EpisodeState,
}

/// Tracks the current state plus step/episode counters.
#[derive(Debug, Clone)]
pub struct EpisodeTracker {
    state: EpisodeState,
    episode: u64,
    steps_in_episode: u32,
}

impl Default for EpisodeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EpisodeTracker {
    pub fn new() -> Self {
        Self {
            state: EpisodeState::Idle,
            episode: 0,
            steps_in_episode: 0,
        }
    }

    pub fn state(&self) -> EpisodeState {
        self.state
    }

    /// Episodes started so far.
    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn steps_in_episode(&self) -> u32 {
        self.steps_in_episode
    }

    pub fn transition(&mut self, to: EpisodeState) -> Result<(), InvalidTransition> {
        let from = self.state;
        if !ALLOWED[from as usize][to as usize] {
            return Err(InvalidTransition { from, to });
        }
        if to == EpisodeState::EpisodeActive {
            self.episode += 1;
            self.steps_in_episode = 0;
        }
        self.state = to;
        if from == to {
            debug!("Episode {} restarted", self.episode);
        } else {
            info!("Episode transition: {} -> {}", from, to);
        }
        Ok(())
    }

    /// Count one step of the active episode.
    pub fn record_step(&mut self) {
        self.steps_in_episode = self.steps_in_episode.saturating_add(1);
    }
}
