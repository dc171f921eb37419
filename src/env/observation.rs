//! Observation vector layout.
//!
//! ```text
//!   [ joint positions (n) | joint velocities (n, velocity mode) |
//!     fingertip x,y (2·k) | object x,y (fiducial) | object yaw | goal ]
//! ```
//!
//! The layout is fixed at construction so every observation of a run has
//! the same length.  Missing readings are encoded with [`MISSING`].

use super::task::Goal;
use crate::sensors::PoseReading;

/// Sentinel for a value that could not be sensed this tick.  Yaw lives in
/// `[0, 360)` so it is never a valid reading there.
pub const MISSING: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationLayout {
    pub joints: usize,
    pub velocities: bool,
    pub fingertips: usize,
    pub object_position: bool,
    pub goal_dims: usize,
}

impl ObservationLayout {
    pub fn len(&self) -> usize {
        let per_joint = if self.velocities { 2 } else { 1 };
        self.joints * per_joint
            + 2 * self.fingertips
            + if self.object_position { 2 } else { 0 }
            + 1
            + self.goal_dims
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn build(
        &self,
        positions: &[i32],
        velocities: &[i32],
        pose: &PoseReading,
        goal: &Goal,
    ) -> Vec<f64> {
        let mut obs = Vec::with_capacity(self.len());
        obs.extend(positions.iter().map(|&p| f64::from(p)));
        if self.velocities {
            obs.extend(velocities.iter().map(|&v| f64::from(v)));
        }
        for i in 0..self.fingertips {
            push_xy(&mut obs, pose.fingertips.get(i).copied().flatten());
        }
        if self.object_position {
            push_xy(&mut obs, pose.position_xy);
        }
        obs.push(pose.yaw.unwrap_or(MISSING));
        obs.extend(goal.encode());
        obs
    }
}

fn push_xy(obs: &mut Vec<f64>, xy: Option<(f64, f64)>) {
    let (x, y) = xy.unwrap_or((MISSING, MISSING));
    obs.push(x);
    obs.push(y);
}
