//! Core value types shared across the workspace.
//!
//! [`DofVariables`] is the universal per-degree-of-freedom record exchanged
//! between sensors, actuators, controllers and the network surface.
//! [`ControlVariable`] names the four entries the motion estimator tracks.

use serde::{Deserialize, Serialize};

/// Number of control variables estimated per degree of freedom
/// (position, velocity, acceleration, force).
pub const CONTROL_VARS_NUMBER: usize = 4;

/// Per-degree-of-freedom control variables.
///
/// The first four entries are the estimator state; inertia, stiffness and
/// damping are carried through untouched for controller-specific use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DofVariables {
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub force: f64,
    pub inertia: f64,
    pub stiffness: f64,
    pub damping: f64,
}

impl DofVariables {
    /// Read the entry selected by a control variable.
    #[inline]
    pub fn variable(&self, var: ControlVariable) -> f64 {
        match var {
            ControlVariable::Position => self.position,
            ControlVariable::Velocity => self.velocity,
            ControlVariable::Acceleration => self.acceleration,
            ControlVariable::Force => self.force,
        }
    }

    /// Write the entry selected by a control variable.
    #[inline]
    pub fn set_variable(&mut self, var: ControlVariable, value: f64) {
        match var {
            ControlVariable::Position => self.position = value,
            ControlVariable::Velocity => self.velocity = value,
            ControlVariable::Acceleration => self.acceleration = value,
            ControlVariable::Force => self.force = value,
        }
    }
}

/// One of the four estimated control variables.
///
/// Configuration files spell these uppercase (`variable = "POSITION"`).
/// The discriminant doubles as the estimator state index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum ControlVariable {
    Position = 0,
    Velocity = 1,
    Acceleration = 2,
    Force = 3,
}

impl ControlVariable {
    /// All variables in state-index order.
    pub const ALL: [Self; CONTROL_VARS_NUMBER] = [
        Self::Position,
        Self::Velocity,
        Self::Acceleration,
        Self::Force,
    ];

    /// Estimator state index of this variable.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl Default for ControlVariable {
    fn default() -> Self {
        Self::Position
    }
}
