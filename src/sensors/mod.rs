//! Object pose sensing: the three variants behind one capability.
//!
//! ```text
//!                    ┌─▶ Encoder   (indicator servo on its own bus)
//!   PoseSource ──────┼─▶ Fiducial  (camera + marker detector, bounded retry)
//!                    └─▶ Magnetic  (MCU over a line-oriented serial link)
//! ```
//!
//! The set is closed and chosen once from configuration.  Every variant
//! answers `get_yaw`, `reset` and `reset_target`; variants without a
//! resettable target treat the latter two as no-ops.
//!
//! `Ok(None)` from a read means "not observed this cycle" and is distinct
//! from a valid zero yaw.  Both the fiducial and the magnetic variant
//! report an exhausted attempt budget this way.  `Err` means the sensing
//! path itself is broken (port, bus or servo).

pub mod encoder;
pub mod fiducial;
pub mod magnetic;

use core::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{EnvironmentError, PoseError};
use encoder::ServoEncoderPose;
use fiducial::FiducialMarkerPose;
use magnetic::MagneticSensorPose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseSourceKind {
    Encoder,
    Fiducial,
    Magnetic,
}

impl fmt::Display for PoseSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Encoder => "encoder",
            Self::Fiducial => "fiducial",
            Self::Magnetic => "magnetic",
        })
    }
}

/// One control tick's view of the object (and fingertips, if tracked).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseReading {
    /// Degrees in `[0, 360)`; `None` when sensing failed this cycle.
    pub yaw: Option<f64>,
    /// Millimetres; only the fiducial variant observes position.
    pub position_xy: Option<(f64, f64)>,
    /// One slot per tracked fingertip marker, in configured order.
    pub fingertips: Vec<Option<(f64, f64)>>,
}

impl PoseReading {
    pub fn yaw_only(yaw: Option<f64>) -> Self {
        Self {
            yaw,
            ..Self::default()
        }
    }

    /// True when nothing usable was sensed.
    pub fn is_unavailable(&self) -> bool {
        self.yaw.is_none() && self.position_xy.is_none()
    }
}

pub enum PoseSource {
    Encoder(ServoEncoderPose),
    Fiducial(FiducialMarkerPose),
    Magnetic(MagneticSensorPose),
}

impl PoseSource {
    pub fn kind(&self) -> PoseSourceKind {
        match self {
            Self::Encoder(_) => PoseSourceKind::Encoder,
            Self::Fiducial(_) => PoseSourceKind::Fiducial,
            Self::Magnetic(_) => PoseSourceKind::Magnetic,
        }
    }

    /// Object yaw in degrees.
    ///
    /// `blindable` and `max_attempts` bound the retries of variants that
    /// can lose sight of the target; the encoder reads exactly once.
    pub fn get_yaw(&mut self, blindable: bool, max_attempts: u32) -> Result<Option<f64>, PoseError> {
        match self {
            Self::Encoder(s) => s.get_yaw().map(Some),
            Self::Fiducial(s) => s.get_yaw(blindable, max_attempts),
            Self::Magnetic(s) => match s.get_yaw(max_attempts) {
                Ok(yaw) => Ok(Some(yaw)),
                // Silent or garbled MCU: not observed this cycle.
                Err(PoseError::SensingUnavailable { attempts, .. }) => {
                    debug!("Magnetic yaw unavailable after {attempts} attempts");
                    Ok(None)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Full reading for observation building and reward computation.
    pub fn sample(&mut self, blindable: bool, max_attempts: u32) -> Result<PoseReading, PoseError> {
        match self {
            Self::Fiducial(s) => s.sample(blindable, max_attempts),
            _ => self.get_yaw(blindable, max_attempts).map(PoseReading::yaw_only),
        }
    }

    /// Decorrelate the next episode's starting pose.
    pub fn reset(&mut self) -> Result<(), PoseError> {
        match self {
            Self::Encoder(s) => s.reset(),
            Self::Fiducial(_) | Self::Magnetic(_) => Ok(()),
        }
    }

    /// Drive the target back to `home`, attributing faults to `gripper_id`.
    pub fn reset_target(&mut self, gripper_id: u8, home: i32) -> Result<(), EnvironmentError> {
        match self {
            Self::Encoder(s) => s.reset_target(home).map_err(|e| {
                EnvironmentError::pose(gripper_id, "Failed while trying to reset target servo", e)
            }),
            Self::Fiducial(_) | Self::Magnetic(_) => Ok(()),
        }
    }
}

/// Wrap any angle into `[0, 360)`.
pub(crate) fn wrap_degrees(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a >= 360.0 { 0.0 } else { a }
}
