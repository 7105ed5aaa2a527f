//! Single-joint position/force PI cascade.
//!
//! The configuration string carries three gains separated by whitespace:
//! position proportional, force proportional, force integral. In
//! operation the position error adds to the commanded force through the
//! proportional gain; the force error then drives a velocity setpoint
//! through a discrete PI law. Calibration replaces the force command with
//! a slow sine sweep so the joint exercises its range.

use std::f64::consts::TAU;

use tracing::debug;

use exo_common::state::RobotState;
use exo_common::types::DofVariables;

use super::RobotController;
use crate::ControlError;

pub struct SimpleJointControl {
    names: Vec<String>,
    joints_changed: Vec<bool>,
    axes_changed: Vec<bool>,

    position_gain: f64,
    force_gain: f64,
    force_integral_gain: f64,

    state: RobotState,
    last_force_error: f64,
    velocity_setpoint: f64,
    running_time: f64,
}

impl SimpleJointControl {
    /// Parse `"<kp_position> <kp_force> <ki_force>"`.
    pub fn new(config: &str) -> Result<Self, ControlError> {
        let mut gains = config
            .split_whitespace()
            .map(|field| field.parse::<f64>());
        let mut next_gain = |name: &str| {
            gains
                .next()
                .and_then(Result::ok)
                .ok_or_else(|| ControlError::ControllerInit {
                    controller: "simple_joint".to_string(),
                    reason: format!("missing or bad {name} gain in '{config}'"),
                })
        };
        let position_gain = next_gain("position")?;
        let force_gain = next_gain("force proportional")?;
        let force_integral_gain = next_gain("force integral")?;

        Ok(Self {
            names: vec!["angle".to_string()],
            joints_changed: vec![true],
            axes_changed: vec![true],
            position_gain,
            force_gain,
            force_integral_gain,
            state: RobotState::Passive,
            last_force_error: 0.0,
            velocity_setpoint: 0.0,
            running_time: 0.0,
        })
    }
}

impl RobotController for SimpleJointControl {
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

    fn set_control_state(&mut self, state: RobotState) {
        debug!(?state, "simple_joint control state");
        self.state = state;
        self.velocity_setpoint = 0.0;
        self.last_force_error = 0.0;
        self.running_time = 0.0;
    }

    fn run_control_step(
        &mut self,
        joint_measures: &mut [DofVariables],
        axis_measures: &mut [DofVariables],
        joint_setpoints: &mut [DofVariables],
        axis_setpoints: &mut [DofVariables],
        dt: f64,
    ) -> (&[bool], &[bool]) {
        axis_measures[0] = joint_measures[0];
        self.running_time += dt;

        let mut total_force = axis_setpoints[0].force;

        if matches!(self.state, RobotState::Operation | RobotState::Calibration) {
            if self.state == RobotState::Calibration {
                // Slow ±2 N sweep over a 4 s period.
                axis_setpoints[0].force = 2.0 * (TAU * self.running_time / 4.0).sin();
                total_force = axis_setpoints[0].force;
            }

            let position_error = axis_setpoints[0].position - axis_measures[0].position;
            if self.state == RobotState::Operation {
                total_force += self.position_gain * position_error;
            }

            let force_error = total_force - axis_measures[0].force;
            self.velocity_setpoint += self.force_gain * (force_error - self.last_force_error)
                + self.force_integral_gain * dt * force_error;
            axis_setpoints[0].velocity = self.velocity_setpoint;
            self.last_force_error = force_error;
        }

        joint_setpoints[0] = axis_setpoints[0];
        joint_setpoints[0].force = total_force;

        (&self.joints_changed, &self.axes_changed)
    }
}
