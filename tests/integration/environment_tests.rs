//! Environment over mock hardware: reset, step ordering, reward, faults.

use gripper_rl::app::ports::CameraCalibration;
use gripper_rl::config::ActionType;
use gripper_rl::drivers::servo::registers::Register;
use gripper_rl::env::episode::EpisodeState;
use gripper_rl::env::observation::MISSING;
use gripper_rl::env::task::Goal;
use gripper_rl::error::EnvironmentError;
use gripper_rl::sensors::PoseSource;
use gripper_rl::sensors::fiducial::FiducialMarkerPose;
use gripper_rl::sensors::magnetic::MagneticSensorPose;

use crate::mock_hw::{
    MockBus, OBJECT_SERVO, ScriptedLine, ScriptedPoses, encoder_pose, make_env, object_step,
    small_config,
};

#[test]
fn rotation_goal_reached_pays_bonus() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 1));

    env.setup().unwrap();
    let obs = env.reset().unwrap();
    assert_eq!(env.goal(), Goal::Angle(90.0));
    assert_eq!(obs.len(), env.observation_size());
    assert_eq!(&obs[..3], &[512.0, 250.0, 750.0]);

    // Pre-move the object sits at 60°, the grasp turns it to 91°.
    object_bus.script_reads(
        OBJECT_SERVO,
        Register::PresentPosition,
        &[object_step(60.0), object_step(91.0)],
    );
    let outcome = env.step(&[600, 300, 700]).unwrap();

    assert!(outcome.done);
    assert!(!outcome.truncated);
    assert_eq!(outcome.reward, 500.0);
    assert_eq!(env.state(), EpisodeState::Terminated);
    assert_eq!(&outcome.observation[..3], &[600.0, 300.0, 700.0]);
    assert!((outcome.observation[3] - 91.0).abs() < 0.1);
    assert_eq!(outcome.observation[4], 90.0);
}

#[test]
fn progress_outside_tolerance_is_not_done() {
    let mut config = small_config();
    config.environment.noise_band = 0.0;
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 1));
    env.reset().unwrap();

    object_bus.script_reads(
        OBJECT_SERVO,
        Register::PresentPosition,
        &[object_step(40.0), object_step(60.0)],
    );
    let outcome = env.step(&[512, 250, 750]).unwrap();
    assert!(!outcome.done);
    assert!((outcome.reward - 20.0).abs() < 0.2);
    assert_eq!(env.state(), EpisodeState::EpisodeActive);
}

#[test]
fn out_of_range_action_sends_nothing() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 1));
    env.reset().unwrap();

    let before = gripper_bus.transactions();
    let err = env.step(&[512, 2000, 750]).unwrap_err();
    assert_eq!(gripper_bus.transactions(), before);
    match err {
        EnvironmentError::Gripper(g) => {
            assert!(g.is_out_of_range());
            assert_eq!(g.first_motor(), Some(2));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn lost_marker_after_move_ends_episode_with_zero_reward() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let poses = ScriptedPoses::new();
    // reset sense, pre-move sense; the post-move sense never sees it.
    poses.push_marker(0, [10.0, 20.0, 0.0], 45.0);
    poses.push_marker(0, [10.0, 20.0, 0.0], 45.0);
    let source = PoseSource::Fiducial(FiducialMarkerPose::new(
        Box::new(poses.clone()),
        CameraCalibration::default(),
        0,
        Vec::new(),
    ));
    let mut env = make_env(&config, &gripper_bus, source);

    let obs = env.reset().unwrap();
    // positions(3) + object xy + yaw + goal
    assert_eq!(obs.len(), 7);
    assert_eq!(&obs[3..6], &[10.0, 20.0, 45.0]);

    let outcome = env.step(&[512, 250, 750]).unwrap();
    assert!(outcome.done);
    assert_eq!(outcome.reward, 0.0);
    assert_eq!(&outcome.observation[3..6], &[MISSING, MISSING, MISSING]);
    assert_eq!(poses.grabs(), 2 + 10);
}

#[test]
fn lost_marker_before_move_ends_episode_with_zero_reward() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let poses = ScriptedPoses::new();
    poses.push_marker(0, [0.0, 0.0, 0.0], 10.0);
    poses.push_empty(10);
    poses.push_marker(0, [0.0, 0.0, 0.0], 90.0);
    let source = PoseSource::Fiducial(FiducialMarkerPose::new(
        Box::new(poses),
        CameraCalibration::default(),
        0,
        Vec::new(),
    ));
    let mut env = make_env(&config, &gripper_bus, source);
    env.reset().unwrap();

    // The post-move yaw is on target, but the missing pre-move read wins.
    let outcome = env.step(&[512, 250, 750]).unwrap();
    assert!(outcome.done);
    assert_eq!(outcome.reward, 0.0);
}

#[test]
fn silent_magnetic_sensor_ends_episode_with_zero_reward() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    // reset sense, pre-move sense; the MCU goes quiet after that.
    let line = ScriptedLine::new(&[b"YAW,10\n", b"YAW,10\n"]);
    let source = PoseSource::Magnetic(MagneticSensorPose::new(Box::new(line.clone())));
    let mut env = make_env(&config, &gripper_bus, source);

    let obs = env.reset().unwrap();
    // positions(3) + yaw + goal
    assert_eq!(obs.len(), 5);
    assert_eq!(obs[3], 10.0);

    let outcome = env.step(&[600, 300, 700]).unwrap();
    assert!(outcome.done);
    assert_eq!(outcome.reward, 0.0);
    assert_eq!(outcome.observation[3], MISSING);
    assert_eq!(env.state(), EpisodeState::Terminated);
    // Two answered requests plus the whole post-move budget.
    let budget = config.object.detection_attempts as usize;
    assert_eq!(line.written().matches("0,\n").count(), 2 + budget);
}

#[test]
fn reset_draws_a_different_goal() {
    let mut config = small_config();
    config.environment.rotation_goals = vec![0.0, 90.0, 180.0, 270.0];
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 3));

    let mut previous = env.goal();
    for _ in 0..20 {
        env.reset().unwrap();
        assert_ne!(env.goal(), previous);
        previous = env.goal();
    }
}

#[test]
fn reset_decorrelates_and_homes() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 5));
    env.reset().unwrap();

    for (id, home) in [(1, 512), (2, 250), (3, 750)] {
        assert_eq!(gripper_bus.get(id, Register::GoalPosition), Some(home));
    }
    // Indicator driven somewhere then released.
    assert_eq!(object_bus.writes_to(Register::GoalPosition).len(), 1);
    assert_eq!(object_bus.get(OBJECT_SERVO, Register::TorqueEnable), Some(0));
}

#[test]
fn step_requires_active_episode() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 1));

    assert_eq!(
        env.step(&[512, 250, 750]).unwrap_err(),
        EnvironmentError::NotActive(EpisodeState::Idle)
    );
    env.reset().unwrap();
    assert_eq!(
        env.step(&[512, 250]).unwrap_err(),
        EnvironmentError::InvalidAction { expected: 3, got: 2 }
    );
}

#[test]
fn comm_fault_during_move_surfaces_motor() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 1));
    env.reset().unwrap();

    gripper_bus.fail(3, Register::GoalPosition, Some(1));
    match env.step(&[512, 250, 700]).unwrap_err() {
        EnvironmentError::Gripper(g) => {
            assert!(g.has_comm_failure());
            assert_eq!(g.first_motor(), Some(3));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(env.state(), EpisodeState::EpisodeActive);
}

#[test]
fn recover_homes_everything_and_keeps_episode() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 1));
    env.reset().unwrap();
    object_bus.set(OBJECT_SERVO, Register::PresentPosition, object_step(0.0));
    env.step(&[100, 100, 100]).unwrap();

    let obs = env.recover().unwrap();
    assert_eq!(&obs[..3], &[512.0, 250.0, 750.0]);
    assert_eq!(object_bus.get(OBJECT_SERVO, Register::GoalPosition), Some(0));
    assert_eq!(env.state(), EpisodeState::EpisodeActive);
}

#[test]
fn recover_reports_target_reset_failure() {
    let config = small_config();
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 1));
    env.reset().unwrap();

    object_bus.fail(OBJECT_SERVO, Register::GoalPosition, None);
    let err = env.recover().unwrap_err();
    assert!(matches!(err, EnvironmentError::Pose { gripper_id: 0, .. }));
    assert!(err.to_string().contains("Failed while trying to reset target servo"));
}

#[test]
fn velocity_mode_drives_towards_limits() {
    let mut config = small_config();
    config.gripper.action_type = ActionType::Velocity;
    let gripper_bus = MockBus::new();
    let object_bus = MockBus::new();
    let mut env = make_env(&config, &gripper_bus, encoder_pose(&object_bus, 1));
    let obs = env.reset().unwrap();
    // positions + velocities + yaw + goal
    assert_eq!(obs.len(), 3 + 3 + 1 + 1);
    object_bus.set(OBJECT_SERVO, Register::PresentPosition, object_step(0.0));

    let goals_before = gripper_bus.writes_to(Register::GoalPosition).len();
    env.step(&[50, -40, 0]).unwrap();

    let speeds = gripper_bus.writes_to(Register::MovingSpeed);
    assert!(speeds.contains(&(1, 50)));
    assert!(speeds.contains(&(2, 40)));
    let goals = &gripper_bus.writes_to(Register::GoalPosition)[goals_before..];
    assert_eq!(goals, &[(1, 1023), (2, 0), (3, 750)]);

    let err = env.step(&[101, 0, 0]).unwrap_err();
    assert!(matches!(err, EnvironmentError::Gripper(ref g) if g.is_out_of_range()));
}
