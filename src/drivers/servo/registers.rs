//! Servo control-table address maps.
//!
//! Every register the control stack touches is named by [`Register`] and
//! resolved to an address and byte width through a [`RegisterTable`].  A
//! table describes one servo model generation as a whole; supporting a new
//! model means adding a new table, never patching entries of an existing
//! one.
//!
//! ```text
//!  Register ──▶ RegisterTable (per model) ──▶ RegisterEntry { address, width }
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

/// Named control-table registers.
///
/// Discriminants index the `entries` array of every [`RegisterTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Register {
    TorqueEnable = 0,
    TorqueLimit = 1,
    Led = 2,
    GoalPosition = 3,
    PresentPosition = 4,
    PresentVelocity = 5,
    MovingSpeed = 6,
    Moving = 7,
}

impl Register {
    /// Number of named registers, used to size the tables.
    pub const COUNT: usize = 8;

    pub const ALL: [Register; Register::COUNT] = [
        Register::TorqueEnable,
        Register::TorqueLimit,
        Register::Led,
        Register::GoalPosition,
        Register::PresentPosition,
        Register::PresentVelocity,
        Register::MovingSpeed,
        Register::Moving,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::TorqueEnable => "torque_enable",
            Self::TorqueLimit => "torque_limit",
            Self::Led => "led",
            Self::GoalPosition => "goal_position",
            Self::PresentPosition => "present_position",
            Self::PresentVelocity => "present_velocity",
            Self::MovingSpeed => "moving_speed",
            Self::Moving => "moving",
        }
    }

    /// Status registers the servo firmware owns.  Writes are rejected
    /// before they reach the bus.
    pub const fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::PresentPosition | Self::PresentVelocity | Self::Moving
        )
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the model encodes signed velocities in its velocity registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityEncoding {
    /// Magnitude in bits 0..=9, direction in bit 10 (set = clockwise).
    SignMagnitude10,
    /// Plain two's complement across the full register width.
    TwosComplement,
}

/// One resolved row of a control table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEntry {
    pub register: Register,
    pub address: u16,
    /// Width in bytes (1, 2 or 4).
    pub width: u8,
}

impl RegisterEntry {
    const fn new(register: Register, address: u16, width: u8) -> Self {
        Self {
            register,
            address,
            width,
        }
    }

    /// Largest raw value the register can hold.
    pub const fn max_value(&self) -> u32 {
        match self.width {
            1 => 0xFF,
            2 => 0xFFFF,
            _ => u32::MAX,
        }
    }
}

/// Complete control table for one servo model generation.
#[derive(Debug, PartialEq, Eq)]
pub struct RegisterTable {
    pub model: &'static str,
    pub velocity_encoding: VelocityEncoding,
    entries: [RegisterEntry; Register::COUNT],
}

impl RegisterTable {
    /// Resolve a register for this model.
    pub fn entry(&self, register: Register) -> RegisterEntry {
        self.entries[register as usize]
    }

    /// Look up the table for a configured model string.
    pub fn for_model(model: &str) -> Option<&'static RegisterTable> {
        MODEL_TABLES.iter().copied().find(|t| t.model == model)
    }
}

/// XL-320: protocol 2.0, 10-bit position, 2-byte motion registers.
pub static XL320: RegisterTable = RegisterTable {
    model: "XL-320",
    velocity_encoding: VelocityEncoding::SignMagnitude10,
    entries: [
        RegisterEntry::new(Register::TorqueEnable, 24, 1),
        RegisterEntry::new(Register::TorqueLimit, 35, 2),
        RegisterEntry::new(Register::Led, 25, 1),
        RegisterEntry::new(Register::GoalPosition, 30, 2),
        RegisterEntry::new(Register::PresentPosition, 37, 2),
        RegisterEntry::new(Register::PresentVelocity, 39, 2),
        RegisterEntry::new(Register::MovingSpeed, 32, 2),
        RegisterEntry::new(Register::Moving, 49, 1),
    ],
};

/// XL330-M077-T: protocol 2.0, 12-bit position, 4-byte motion registers.
/// `torque_limit` maps to goal current and `moving_speed` to the profile
/// velocity.
pub static XL330: RegisterTable = RegisterTable {
    model: "XL330-M077-T",
    velocity_encoding: VelocityEncoding::TwosComplement,
    entries: [
        RegisterEntry::new(Register::TorqueEnable, 64, 1),
        RegisterEntry::new(Register::TorqueLimit, 102, 2),
        RegisterEntry::new(Register::Led, 65, 1),
        RegisterEntry::new(Register::GoalPosition, 116, 4),
        RegisterEntry::new(Register::PresentPosition, 132, 4),
        RegisterEntry::new(Register::PresentVelocity, 128, 4),
        RegisterEntry::new(Register::MovingSpeed, 112, 4),
        RegisterEntry::new(Register::Moving, 122, 1),
    ],
};

static MODEL_TABLES: [&RegisterTable; 2] = [&XL320, &XL330];
