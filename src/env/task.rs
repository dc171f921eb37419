//! Task definitions: goal selection and reward.
//!
//! Rotation turns the object to one of a few target yaws; translation
//! pushes it into a target point inside a rectangle.  Both pay a fixed
//! bonus once within tolerance and end the episode.
//!
//! A missing pose on either side of a step ends the episode with zero
//! reward.  A missing reading is never treated as "no change".

use rand::Rng;

use crate::config::{EnvironmentConfig, TaskKind};
use crate::sensors::PoseReading;

/// Target for the current episode.  Immutable until the next reset or an
/// explicit resample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Goal {
    /// Degrees in `[0, 360)`.
    Angle(f64),
    /// Millimetres.
    Position([f64; 2]),
}

impl Goal {
    /// Observation encoding of the goal.
    pub fn encode(&self) -> Vec<f64> {
        match *self {
            Self::Angle(a) => vec![a],
            Self::Position([x, y]) => vec![x, y],
        }
    }

    pub fn dims(&self) -> usize {
        match self {
            Self::Angle(_) => 1,
            Self::Position(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardShaping {
    pub tolerance: f64,
    pub bonus: f64,
    /// Rotation progress within ±band is treated as sensor jitter.
    pub noise_band: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Rotation { goals: Vec<f64> },
    Translation { min: [f64; 2], max: [f64; 2] },
}

impl Task {
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        match config.task {
            TaskKind::Rotation => Self::Rotation {
                goals: config.rotation_goals.clone(),
            },
            TaskKind::Translation => Self::Translation {
                min: config.goal_min,
                max: config.goal_max,
            },
        }
    }

    /// Draw a fresh goal.
    ///
    /// Rotation never repeats `previous` when another candidate exists.
    pub fn choose_goal<R: Rng + ?Sized>(&self, rng: &mut R, previous: Option<&Goal>) -> Goal {
        match self {
            Self::Rotation { goals } => {
                let prev = match previous {
                    Some(Goal::Angle(a)) => goals.iter().position(|g| g == a),
                    _ => None,
                };
                let idx = match prev {
                    Some(p) if goals.len() > 1 => {
                        let i = rng.gen_range(0..goals.len() - 1);
                        if i >= p { i + 1 } else { i }
                    }
                    _ => rng.gen_range(0..goals.len()),
                };
                Goal::Angle(goals[idx])
            }
            Self::Translation { min, max } => Goal::Position([
                rng.gen_range(min[0]..max[0]),
                rng.gen_range(min[1]..max[1]),
            ]),
        }
    }

    /// `(reward, done)` for a transition from `before` to `after`.
    pub fn reward(
        &self,
        goal: &Goal,
        before: &PoseReading,
        after: &PoseReading,
        shaping: &RewardShaping,
    ) -> (f64, bool) {
        match *goal {
            Goal::Angle(target) => {
                let (Some(yaw_before), Some(yaw_after)) = (before.yaw, after.yaw) else {
                    return (0.0, true);
                };
                let dist_after = angular_distance(target, yaw_after);
                if dist_after <= shaping.tolerance {
                    return (shaping.bonus, true);
                }
                let progress = angular_distance(target, yaw_before) - dist_after;
                (dead_zone(progress, shaping.noise_band), false)
            }
            Goal::Position(target) => {
                let (Some(_), Some(xy)) = (before.position_xy, after.position_xy) else {
                    return (0.0, true);
                };
                let dist = (xy.0 - target[0]).hypot(xy.1 - target[1]);
                if dist <= shaping.tolerance {
                    (shaping.bonus, true)
                } else {
                    (-dist, false)
                }
            }
        }
    }
}

/// Shortest unsigned angle between two headings, in `[0, 180]`.
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Shrink `x` toward zero by `band`, zero inside the band.  Continuous.
pub fn dead_zone(x: f64, band: f64) -> f64 {
    if x.abs() <= band { 0.0 } else { x - band.copysign(x) }
}
