//! Two-joint impedance controller with per-joint pass-through kinematics.
//!
//! Each joint maps one-to-one onto an axis. Setpoints flow through
//! unchanged except for the force command, which an impedance law shapes
//! from the commanded stiffness and damping:
//!
//! ```text
//! F += K·(x_d − x) − B·(ẋ_d − ẋ) − B·ẋ
//! ```

use exo_common::state::RobotState;
use exo_common::types::DofVariables;

use super::RobotController;

const DOFS_NUMBER: usize = 2;

pub struct DualMotorsControl {
    names: Vec<String>,
    joints_changed: Vec<bool>,
    axes_changed: Vec<bool>,
    state: RobotState,
    elapsed_time: f64,
}

impl DualMotorsControl {
    pub fn new() -> Self {
        Self {
            names: vec!["angle1".to_string(), "angle2".to_string()],
            joints_changed: vec![true; DOFS_NUMBER],
            axes_changed: vec![true; DOFS_NUMBER],
            state: RobotState::Passive,
            elapsed_time: 0.0,
        }
    }

    /// Lifecycle state last forwarded by the robot.
    pub fn control_state(&self) -> RobotState {
        self.state
    }

    fn control_joint(
        joint_measures: &DofVariables,
        axis_measures: &mut DofVariables,
        joint_setpoints: &mut DofVariables,
        axis_setpoints: &DofVariables,
    ) {
        *axis_measures = *joint_measures;
        *joint_setpoints = *axis_setpoints;

        let position_error = joint_setpoints.position - joint_measures.position;
        let velocity_error = joint_setpoints.velocity - joint_measures.velocity;

        let control_force = joint_setpoints.stiffness * position_error
            - joint_setpoints.damping * velocity_error;
        let damping_force = joint_setpoints.damping * joint_measures.velocity;
        joint_setpoints.force += control_force - damping_force;
    }
}

impl Default for DualMotorsControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotController for DualMotorsControl {
    fn joints_number(&self) -> usize {
        DOFS_NUMBER
    }

    fn joint_names(&self) -> &[String] {
        &self.names
    }

    fn axes_number(&self) -> usize {
        DOFS_NUMBER
    }

    fn axis_names(&self) -> &[String] {
        &self.names
    }

    fn set_control_state(&mut self, state: RobotState) {
        if state == RobotState::Preprocessing {
            self.elapsed_time = 0.0;
        }
        self.state = state;
    }

    fn run_control_step(
        &mut self,
        joint_measures: &mut [DofVariables],
        axis_measures: &mut [DofVariables],
        joint_setpoints: &mut [DofVariables],
        axis_setpoints: &mut [DofVariables],
        dt: f64,
    ) -> (&[bool], &[bool]) {
        for joint in 0..DOFS_NUMBER {
            Self::control_joint(
                &joint_measures[joint],
                &mut axis_measures[joint],
                &mut joint_setpoints[joint],
                &axis_setpoints[joint],
            );
        }
        self.elapsed_time += dt;
        (&self.joints_changed, &self.axes_changed)
    }
}
