//! Fiducial-marker pose from a vision collaborator.
//!
//! Each attempt grabs a frame and asks the detector for every visible
//! marker.  The attempt succeeds when the tracked object marker is present.
//! Poses of the last successful attempt are cached so fingertip markers can
//! be read from the same frame as the object.

use std::collections::HashMap;

use log::{debug, warn};

use super::{PoseReading, wrap_degrees};
use crate::app::ports::{CameraCalibration, MarkerPose, PoseProvider};
use crate::error::PoseError;

pub struct FiducialMarkerPose {
    provider: Box<dyn PoseProvider>,
    calibration: CameraCalibration,
    marker_id: u32,
    fingertip_ids: Vec<u32>,
    last_poses: HashMap<u32, MarkerPose>,
    attempts_made: u64,
}

impl FiducialMarkerPose {
    pub fn new(
        provider: Box<dyn PoseProvider>,
        calibration: CameraCalibration,
        marker_id: u32,
        fingertip_ids: Vec<u32>,
    ) -> Self {
        Self {
            provider,
            calibration,
            marker_id,
            fingertip_ids,
            last_poses: HashMap::new(),
            attempts_made: 0,
        }
    }

    /// Detection attempts issued since construction.
    pub fn attempts_made(&self) -> u64 {
        self.attempts_made
    }

    /// Yaw of the tracked marker.
    ///
    /// With `blindable`, gives up after exactly `max_attempts` attempts and
    /// returns `Ok(None)`.  Without it, retries until the marker is seen:
    /// a caller that cannot tolerate a stall must pass `blindable = true`.
    pub fn get_yaw(&mut self, blindable: bool, max_attempts: u32) -> Result<Option<f64>, PoseError> {
        let mut attempt: u32 = 0;
        while !blindable || attempt < max_attempts {
            attempt = attempt.saturating_add(1);
            self.attempts_made += 1;
            debug!("Attempting to detect marker {} (attempt {attempt})", self.marker_id);
            if let Some(pose) = self.detect() {
                return Ok(Some(wrap_degrees(pose.yaw())));
            }
        }
        debug!("Marker {} not seen in {max_attempts} attempts", self.marker_id);
        self.last_poses.clear();
        Ok(None)
    }

    pub fn sample(&mut self, blindable: bool, max_attempts: u32) -> Result<PoseReading, PoseError> {
        let yaw = self.get_yaw(blindable, max_attempts)?;
        let xy = |p: &MarkerPose| (p.position[0], p.position[1]);
        Ok(PoseReading {
            yaw,
            position_xy: yaw.and(self.last_poses.get(&self.marker_id).map(xy)),
            fingertips: self
                .fingertip_ids
                .iter()
                .map(|id| self.last_poses.get(id).map(xy))
                .collect(),
        })
    }

    fn detect(&mut self) -> Option<MarkerPose> {
        let frame = match self.provider.grab_frame() {
            Ok(f) => f,
            Err(e) => {
                warn!("{e}");
                return None;
            }
        };
        match self.provider.get_marker_poses(&frame, &self.calibration) {
            Ok(poses) => {
                let found = poses.get(&self.marker_id).copied();
                if found.is_some() {
                    self.last_poses = poses;
                }
                found
            }
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }
}
