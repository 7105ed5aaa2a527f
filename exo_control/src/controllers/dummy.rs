//! Single-DoF pass-through controller with a stiffness force term.
//!
//! Axis measures mirror the joint; joint setpoints mirror the axis, with
//! the force setpoint replaced by `stiffness × position error`. Useful as
//! a wiring check for one-joint rigs.

use exo_common::state::RobotState;
use exo_common::types::DofVariables;

use super::RobotController;

pub struct DummyControl {
    names: Vec<String>,
    joints_changed: Vec<bool>,
    axes_changed: Vec<bool>,
}

impl DummyControl {
    pub fn new() -> Self {
        Self {
            names: vec!["angle".to_string()],
            joints_changed: vec![true],
            axes_changed: vec![true],
        }
    }
}

impl Default for DummyControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotController for DummyControl {
    fn joints_number(&self) -> usize {
        1
    }

    fn joint_names(&self) -> &[String] {
        &self.names
    }

    fn axes_number(&self) -> usize {
        1
    }

    fn axis_names(&self) -> &[String] {
        &self.names
    }

    fn set_control_state(&mut self, _state: RobotState) {}

    fn run_control_step(
        &mut self,
        joint_measures: &mut [DofVariables],
        axis_measures: &mut [DofVariables],
        joint_setpoints: &mut [DofVariables],
        axis_setpoints: &mut [DofVariables],
        _dt: f64,
    ) -> (&[bool], &[bool]) {
        axis_measures[0] = joint_measures[0];
        joint_setpoints[0] = axis_setpoints[0];

        let position_error = joint_setpoints[0].position - joint_measures[0].position;
        joint_setpoints[0].force = joint_setpoints[0].stiffness * position_error;

        (&self.joints_changed, &self.axes_changed)
    }
}
