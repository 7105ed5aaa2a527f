//! Robot lifecycle tests over mock devices: enable, state transitions,
//! setpoint flow and clean shutdown.

use std::fs;
use std::time::{Duration, Instant};

use exo_common::env::ConfigKind;
use exo_common::state::RobotState;
use exo_common::types::DofVariables;
use exo_common::Environment;
use exo_control::{ControlError, Robot};
use exo_hal::drivers::mock;
use exo_hal::DeviceManager;

/// Builds a one-joint robot config tree (dummy controller, mock devices)
/// tagged so mock states don't collide between tests.
fn rig(tag: &str) -> (tempfile::TempDir, Environment) {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment::new(dir.path(), dir.path().join("logs"));
    for kind in [ConfigKind::Robot, ConfigKind::Actuators, ConfigKind::Motor, ConfigKind::Sensors] {
        fs::create_dir_all(env.config_dir(kind)).unwrap();
    }
    fs::write(
        env.config_dir(ConfigKind::Robot).join("rig.toml"),
        "controller = { type = \"dummy\", config = \"\", time_step = 0.001 }\n\
         actuators = [\"joint\"]\n",
    )
    .unwrap();
    fs::write(
        env.config_dir(ConfigKind::Actuators).join("joint.toml"),
        "motor = { variable = \"POSITION\", config = \"servo\" }\n\
         [[sensors]]\n\
         variable = \"POSITION\"\n\
         config = \"encoder\"\n\
         deviation = 0.1\n",
    )
    .unwrap();
    fs::write(
        env.config_dir(ConfigKind::Sensors).join("encoder.toml"),
        format!(
            "[[inputs]]\ninterface = {{ type = \"mock\", config = \"{tag}-enc\", channel = 0 }}\n"
        ),
    )
    .unwrap();
    fs::write(
        env.config_dir(ConfigKind::Motor).join("servo.toml"),
        format!("interface = {{ type = \"mock\", config = \"{tag}-mot\", channel = 0 }}\n"),
    )
    .unwrap();
    (dir, env)
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn enable_runs_the_control_thread_and_disable_stops_it() {
    let (_dir, env) = rig("life");
    let manager = DeviceManager::default();
    let mut robot = Robot::from_name(&env, &manager, "rig").unwrap();

    assert!(!robot.is_enabled());
    robot.enable().unwrap();
    assert!(robot.is_enabled());
    assert_eq!(robot.control_state(), RobotState::Offset);

    assert!(
        wait_until(Duration::from_secs(2), || robot.ticks() > 10),
        "control thread never ticked"
    );

    robot.disable().unwrap();
    assert!(!robot.is_enabled());

    // No stragglers: the tick counter settles once disabled.
    let settled = robot.ticks();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(robot.ticks(), settled);

    // The shutdown wrote a final zero setpoint to the motor.
    assert_eq!(mock::state("life-mot").last_write(), Some((0, 0.0)));
}

#[test]
fn double_enable_and_double_disable_are_refused() {
    let (_dir, env) = rig("double");
    let manager = DeviceManager::default();
    let mut robot = Robot::from_name(&env, &manager, "rig").unwrap();

    robot.enable().unwrap();
    assert!(matches!(robot.enable(), Err(ControlError::Refused(_))));
    robot.disable().unwrap();
    assert!(matches!(robot.disable(), Err(ControlError::Refused(_))));

    // The robot comes back up after a clean stop.
    robot.enable().unwrap();
    robot.disable().unwrap();
}

#[test]
fn motor_is_silent_until_operation() {
    let (_dir, env) = rig("offset");
    let manager = DeviceManager::default();
    let motor_state = mock::state("offset-mot");
    let mut robot = Robot::from_name(&env, &manager, "rig").unwrap();

    robot.enable().unwrap();
    assert!(wait_until(Duration::from_secs(2), || robot.ticks() > 20));

    // Offset state: the loop runs but nothing reaches the device.
    let writes_during_offset = motor_state.write_count();
    let ticks_before = robot.ticks();
    assert!(wait_until(Duration::from_secs(2), || {
        robot.ticks() > ticks_before + 20
    }));
    assert_eq!(motor_state.write_count(), writes_during_offset);

    // Operation: setpoints start flowing every tick.
    assert!(robot.set_control_state(RobotState::Operation));
    assert!(
        wait_until(Duration::from_secs(2), || motor_state.write_count()
            > writes_during_offset + 5),
        "no writes after operate"
    );

    robot.disable().unwrap();
}

#[test]
fn axis_setpoints_reach_the_motor_within_a_few_ticks() {
    let (_dir, env) = rig("flow");
    let manager = DeviceManager::default();
    let motor_state = mock::state("flow-mot");
    let mut robot = Robot::from_name(&env, &manager, "rig").unwrap();

    robot.enable().unwrap();
    assert!(robot.set_control_state(RobotState::Operation));

    let setpoints = DofVariables {
        position: 0.5,
        ..DofVariables::default()
    };
    robot.set_axis_setpoints(0, &setpoints);

    // The dummy controller passes axis position straight to the joint;
    // the motor's variable is POSITION with unit gain.
    assert!(
        wait_until(Duration::from_secs(2), || {
            motor_state.last_write() == Some((0, 0.5))
        }),
        "setpoint never reached the device: {:?}",
        motor_state.last_write()
    );

    robot.disable().unwrap();
}

#[test]
fn repeated_state_requests_are_noops() {
    let (_dir, env) = rig("noop");
    let manager = DeviceManager::default();
    let mut robot = Robot::from_name(&env, &manager, "rig").unwrap();

    assert!(robot.set_control_state(RobotState::Calibration));
    assert!(!robot.set_control_state(RobotState::Calibration));
    assert!(robot.set_control_state(RobotState::Operation));
    assert!(!robot.set_control_state(RobotState::Operation));
}

#[test]
fn measures_are_published_with_change_flags() {
    let (_dir, env) = rig("publish");
    let manager = DeviceManager::default();
    mock::state("publish-enc").set_sample(0.75);
    let mut robot = Robot::from_name(&env, &manager, "rig").unwrap();

    robot.enable().unwrap();
    assert!(robot.set_control_state(RobotState::Operation));
    assert!(wait_until(Duration::from_secs(2), || robot.ticks() > 50));

    let (joint, joint_changed) = robot.joint_measures(0).unwrap();
    assert!(joint_changed);
    assert!((joint.position - 0.75).abs() < 0.2, "position {}", joint.position);
    let (axis, axis_changed) = robot.axis_measures(0).unwrap();
    assert!(axis_changed);
    assert!((axis.position - 0.75).abs() < 0.2);

    // Out-of-range indices read as absent.
    assert!(robot.joint_measures(5).is_none());
    assert!(robot.axis_measures(5).is_none());

    robot.disable().unwrap();
}

#[test]
fn actuator_count_must_match_controller_joints() {
    let (_dir, env) = rig("contract");
    // dual_motors drives two joints; the rig provides one actuator.
    fs::write(
        env.config_dir(ConfigKind::Robot).join("mismatch.toml"),
        "controller = { type = \"dual_motors\", config = \"\" }\n\
         actuators = [\"joint\"]\n",
    )
    .unwrap();
    let manager = DeviceManager::default();
    assert!(matches!(
        Robot::from_name(&env, &manager, "mismatch"),
        Err(ControlError::Contract(_))
    ));
}

#[test]
fn unknown_controller_fails_construction() {
    let (_dir, env) = rig("unknown");
    fs::write(
        env.config_dir(ConfigKind::Robot).join("broken.toml"),
        "controller = { type = \"anklebot\", config = \"\" }\n",
    )
    .unwrap();
    let manager = DeviceManager::default();
    assert!(matches!(
        Robot::from_name(&env, &manager, "broken"),
        Err(ControlError::ControllerNotFound(_))
    ));
}
