//! Action space: agent range `[-1, 1]` ⟷ joint units.
//!
//! Position mode bounds are the joints' step limits; velocity mode bounds
//! are `±speed_limit`.  `denormalize` rounds and clamps, so its output is
//! always inside the bounds the servos enforce.

use rand::Rng;

use crate::config::{ActionType, GripperConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpace {
    min: Vec<i32>,
    max: Vec<i32>,
}

impl ActionSpace {
    pub fn new(min: Vec<i32>, max: Vec<i32>) -> Self {
        debug_assert_eq!(min.len(), max.len());
        Self { min, max }
    }

    pub fn from_config(config: &GripperConfig) -> Self {
        let (min, max) = match config.action_type {
            ActionType::Position => config
                .joints
                .iter()
                .map(|j| (j.min_step, j.max_step))
                .unzip(),
            ActionType::Velocity => config
                .joints
                .iter()
                .map(|j| (-i32::from(j.speed_limit), i32::from(j.speed_limit)))
                .unzip(),
        };
        Self::new(min, max)
    }

    pub fn dims(&self) -> usize {
        self.min.len()
    }

    pub fn contains(&self, action: &[i32]) -> bool {
        action.len() == self.dims()
            && action
                .iter()
                .zip(self.min.iter().zip(&self.max))
                .all(|(a, (lo, hi))| lo <= a && a <= hi)
    }

    /// Joint units → `[-1, 1]`.
    pub fn normalize(&self, action: &[i32]) -> Vec<f64> {
        self.bounds()
            .zip(action)
            .map(|((lo, hi), &a)| {
                let span = f64::from(hi - lo);
                if span == 0.0 {
                    0.0
                } else {
                    2.0 * f64::from(a - lo) / span - 1.0
                }
            })
            .collect()
    }

    /// `[-1, 1]` → joint units, rounded and clamped.  NaN maps to the
    /// midpoint.
    pub fn denormalize(&self, action: &[f64]) -> Vec<i32> {
        self.bounds()
            .zip(action)
            .map(|((lo, hi), &a)| {
                let a = if a.is_nan() { 0.0 } else { a.clamp(-1.0, 1.0) };
                let v = f64::from(lo) + (a + 1.0) / 2.0 * f64::from(hi - lo);
                (v.round() as i32).clamp(lo, hi)
            })
            .collect()
    }

    /// Uniform random action for exploration.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<i32> {
        self.bounds().map(|(lo, hi)| rng.gen_range(lo..=hi)).collect()
    }

    fn bounds(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.min.iter().copied().zip(self.max.iter().copied())
    }
}
