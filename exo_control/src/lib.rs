//! Sensor fusion, actuator composition and the robot control loop.
//!
//! The pipeline, bottom up:
//!
//! - [`signal`] — per-channel acquisition: rectification, band-pass
//!   filtering, offset/calibration phases, expression composition.
//! - [`motor`] — one generation channel with gain and offset handling.
//! - [`kalman`] — the per-actuator motion estimator.
//! - [`actuator`] — motor + sensors + estimator behind one state machine.
//! - [`controllers`] — the pluggable joint↔axis control-law capability.
//! - [`robot`] — owns actuators and controller, runs the periodic
//!   control thread and publishes joint/axis records to the dispatcher.

pub mod actuator;
pub mod controllers;
pub mod kalman;
pub mod motor;
pub mod robot;
mod rt;
pub mod signal;

use thiserror::Error;

pub use actuator::Actuator;
pub use controllers::RobotController;
pub use kalman::KalmanFilter;
pub use motor::Motor;
pub use robot::Robot;

use exo_common::config::ConfigError;
use exo_hal::HalError;

/// Errors raised while building or driving the control stack.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Configuration file missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Signal-I/O layer failure.
    #[error(transparent)]
    Hal(#[from] HalError),

    /// No controller registered under the requested lookup key.
    #[error("robot controller not found: {0}")]
    ControllerNotFound(String),

    /// Controller rejected its configuration string.
    #[error("robot controller '{controller}' init failed: {reason}")]
    ControllerInit { controller: String, reason: String },

    /// Controller and configuration disagree on dimensions.
    #[error("controller contract violation: {0}")]
    Contract(String),

    /// Motor enable failed while bringing the robot up.
    #[error("actuator '{0}' failed to enable")]
    EnableFailed(String),

    /// Lifecycle request that is a no-op or not allowed now.
    #[error("state machine refusal: {0}")]
    Refused(&'static str),

    /// The control thread did not exit within the join timeout.
    #[error("control thread join timed out")]
    JoinTimeout,
}
