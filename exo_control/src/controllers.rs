//! Robot controller capability: joint↔axis conversion and control law.
//!
//! Controllers are stateful across ticks and invoked only from the robot
//! control thread; they read joint measures and axis setpoints, write
//! axis measures and joint setpoints, and report per-DoF change masks.
//! Implementations are linked statically and selected by lookup key (the
//! name that would be a `plugins/robot_control/<name>` path in a
//! dynamically loaded deployment).

pub mod dual_motors;
pub mod dummy;
pub mod simple_joint;

use exo_common::state::RobotState;
use exo_common::types::DofVariables;

use crate::ControlError;

/// Joint↔axis control-law boundary.
///
/// The core guarantees: `dt` is the wall-clock delta since the previous
/// step (initially the configured period), joint measures are filled
/// before the call, joint setpoints are applied after it. Implementations
/// need not be thread-safe.
pub trait RobotController: Send {
    /// Number of joint-space degrees of freedom.
    fn joints_number(&self) -> usize;

    /// Joint names, `joints_number` entries.
    fn joint_names(&self) -> &[String];

    /// Number of task-space degrees of freedom.
    fn axes_number(&self) -> usize;

    /// Axis names, `axes_number` entries.
    fn axis_names(&self) -> &[String];

    /// Observe a robot lifecycle transition.
    fn set_control_state(&mut self, state: RobotState);

    /// One control pass. Returns the per-joint and per-axis change masks
    /// for this tick (borrowed from the controller, valid until the next
    /// call).
    fn run_control_step(
        &mut self,
        joint_measures: &mut [DofVariables],
        axis_measures: &mut [DofVariables],
        joint_setpoints: &mut [DofVariables],
        axis_setpoints: &mut [DofVariables],
        dt: f64,
    ) -> (&[bool], &[bool]);
}

/// Instantiate a controller by lookup key.
///
/// # Errors
/// `ControllerNotFound` for unknown keys, `ControllerInit` when the
/// implementation rejects its configuration string.
pub fn create_controller(
    kind: &str,
    config: &str,
) -> Result<Box<dyn RobotController>, ControlError> {
    match kind {
        "dummy" => Ok(Box::new(dummy::DummyControl::new())),
        "simple_joint" => Ok(Box::new(simple_joint::SimpleJointControl::new(config)?)),
        "dual_motors" => Ok(Box::new(dual_motors::DualMotorsControl::new())),
        other => Err(ControlError::ControllerNotFound(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_covers_builtins() {
        for kind in ["dummy", "simple_joint", "dual_motors"] {
            let controller = create_controller(kind, "1 1 1").unwrap();
            assert!(controller.joints_number() > 0);
            assert_eq!(controller.joint_names().len(), controller.joints_number());
            assert_eq!(controller.axis_names().len(), controller.axes_number());
        }
    }

    #[test]
    fn unknown_controller_is_an_error() {
        assert!(matches!(
            create_controller("anklebot", ""),
            Err(ControlError::ControllerNotFound(_))
        ));
    }
}
