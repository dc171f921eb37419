//! Pose variants against scripted hardware.

use gripper_rl::app::ports::CameraCalibration;
use gripper_rl::drivers::servo::registers::Register;
use gripper_rl::error::PoseError;
use gripper_rl::sensors::PoseSourceKind;
use gripper_rl::sensors::fiducial::FiducialMarkerPose;
use gripper_rl::sensors::magnetic::MagneticSensorPose;

use crate::mock_hw::{MockBus, OBJECT_SERVO, ScriptedLine, ScriptedPoses, encoder_pose, object_step};

// ── Magnetic ──────────────────────────────────────────────────

#[test]
fn magnetic_skips_stale_reply_from_other_command() {
    let line = ScriptedLine::new(&[b"OFFSET,1\n", b"YAW,173.5\n"]);
    let mut sensor = MagneticSensorPose::new(Box::new(line.clone()));

    let yaw = sensor.get_yaw(5).unwrap();
    assert!((yaw - 173.5).abs() < 1e-9);
    assert_eq!(sensor.requests_sent(), 2);
    assert_eq!(line.written(), "0,\n0,\n");
}

#[test]
fn magnetic_retries_garbled_payloads() {
    let line = ScriptedLine::new(&[b"YAW\n", b"YAW,abc\n", b"\xFF\xFE\n", b"YAW,-10\n"]);
    let mut sensor = MagneticSensorPose::new(Box::new(line));

    let yaw = sensor.get_yaw(5).unwrap();
    assert!((yaw - 350.0).abs() < 1e-9);
    assert_eq!(sensor.requests_sent(), 4);
}

#[test]
fn magnetic_budget_exhausted_is_unavailable() {
    let line = ScriptedLine::new(&[]);
    let mut sensor = MagneticSensorPose::new(Box::new(line.clone()));

    let err = sensor.get_yaw(3).unwrap_err();
    assert_eq!(
        err,
        PoseError::SensingUnavailable {
            source_kind: PoseSourceKind::Magnetic,
            attempts: 3,
        }
    );
    assert_eq!(sensor.requests_sent(), 3);
    assert_eq!(line.written(), "0,\n0,\n0,\n");
}

#[test]
fn magnetic_overlong_line_keeps_following_reply() {
    let mut reply = vec![b'x'; 80];
    reply.extend_from_slice(b"\nYAW,42\n");
    let line = ScriptedLine::new(&[reply.as_slice()]);
    let mut sensor = MagneticSensorPose::new(Box::new(line));

    let yaw = sensor.get_yaw(3).unwrap();
    assert!((yaw - 42.0).abs() < 1e-9);
    assert_eq!(sensor.requests_sent(), 1);
}

#[test]
fn magnetic_line_filling_buffer_exactly_is_dropped_alone() {
    // 64 bytes of noise with no newline, then the tail and a valid reply.
    let mut reply = vec![b'#'; 64];
    reply.extend_from_slice(b"tail\nYAW,7.5\n");
    let line = ScriptedLine::new(&[reply.as_slice()]);
    let mut sensor = MagneticSensorPose::new(Box::new(line));

    assert!((sensor.get_yaw(2).unwrap() - 7.5).abs() < 1e-9);
    assert_eq!(sensor.requests_sent(), 1);
}

#[test]
fn magnetic_open_calibrates_offset() {
    let line = ScriptedLine::new(&[b"OFFSET,1\n"]);
    let sensor = MagneticSensorPose::open(Box::new(line.clone()), Some(45.5), 3).unwrap();
    assert_eq!(sensor.requests_sent(), 1);
    assert_eq!(line.written(), "1,45.5\n");
}

#[test]
fn magnetic_open_without_calibration_is_silent() {
    let line = ScriptedLine::new(&[]);
    let sensor = MagneticSensorPose::open(Box::new(line.clone()), None, 3).unwrap();
    assert_eq!(sensor.requests_sent(), 0);
    assert!(line.written().is_empty());
}

// ── Fiducial ──────────────────────────────────────────────────

fn fiducial(poses: &ScriptedPoses) -> FiducialMarkerPose {
    FiducialMarkerPose::new(Box::new(poses.clone()), CameraCalibration::default(), 0, vec![1, 2])
}

#[test]
fn fiducial_blindable_gives_up_after_exact_budget() {
    let poses = ScriptedPoses::new();
    let mut sensor = fiducial(&poses);

    assert_eq!(sensor.get_yaw(true, 10).unwrap(), None);
    assert_eq!(poses.grabs(), 10);
    assert_eq!(sensor.attempts_made(), 10);
}

#[test]
fn fiducial_yaw_is_wrapped() {
    let poses = ScriptedPoses::new();
    poses.push_marker(0, [0.0, 0.0, 0.0], -30.0);
    let mut sensor = fiducial(&poses);

    let yaw = sensor.get_yaw(true, 10).unwrap().unwrap();
    assert!((yaw - 330.0).abs() < 1e-9);
}

#[test]
fn fiducial_non_blindable_keeps_looking() {
    let poses = ScriptedPoses::new();
    poses.push_empty(24);
    poses.push_marker(0, [0.0, 0.0, 0.0], 12.0);
    let mut sensor = fiducial(&poses);

    // Budget is ignored when the caller cannot go blind.
    assert_eq!(sensor.get_yaw(false, 10).unwrap(), Some(12.0));
    assert_eq!(sensor.attempts_made(), 25);
}

#[test]
fn fiducial_vision_error_costs_an_attempt() {
    let poses = ScriptedPoses::new();
    poses.push_error("camera unplugged");
    poses.push_marker(0, [0.0, 0.0, 0.0], 5.0);
    let mut sensor = fiducial(&poses);

    assert_eq!(sensor.get_yaw(true, 2).unwrap(), Some(5.0));
    assert_eq!(sensor.attempts_made(), 2);
}

#[test]
fn fiducial_sample_reads_fingertips_from_same_frame() {
    use std::collections::HashMap;

    use gripper_rl::app::ports::MarkerPose;

    let poses = ScriptedPoses::new();
    let at = |x: f64, y: f64| MarkerPose {
        position: [x, y, 0.0],
        orientation: [0.0, 0.0, 90.0],
    };
    poses.push_poses(HashMap::from([(0, at(1.0, 2.0)), (2, at(5.0, 6.0))]));
    let mut sensor = fiducial(&poses);

    let reading = sensor.sample(true, 3).unwrap();
    assert_eq!(reading.yaw, Some(90.0));
    assert_eq!(reading.position_xy, Some((1.0, 2.0)));
    assert_eq!(reading.fingertips, vec![None, Some((5.0, 6.0))]);
}

// ── Encoder ───────────────────────────────────────────────────

#[test]
fn encoder_yaw_is_one_transaction() {
    let object_bus = MockBus::new();
    object_bus.set(OBJECT_SERVO, Register::PresentPosition, object_step(180.0));
    let mut pose = encoder_pose(&object_bus, 1);

    let yaw = pose.get_yaw(true, 10).unwrap().unwrap();
    assert!((yaw - 180.0).abs() < 0.1);
    assert_eq!(object_bus.transactions(), 1);
}

#[test]
fn encoder_reset_target_releases_servo_at_home() {
    let object_bus = MockBus::new();
    let mut pose = encoder_pose(&object_bus, 1);

    pose.reset_target(0, 2048).unwrap();
    assert_eq!(object_bus.get(OBJECT_SERVO, Register::GoalPosition), Some(2048));
    assert_eq!(object_bus.get(OBJECT_SERVO, Register::TorqueEnable), Some(0));
}
