//! Lifecycle state machines shared between the robot, its actuators and
//! the signal pipeline.
//!
//! Three levels exist: the robot-wide [`RobotState`] driven by network
//! commands, the per-actuator [`ControlState`] derived from it, and the
//! per-input [`SignalPhase`] the processors run in. All enums are
//! `#[repr(u8)]` so the network surface can move them as single bytes.

use serde::{Deserialize, Serialize};

/// Robot-wide control lifecycle state.
///
/// Only the event channel may change it. `Preprocessing` is forwarded to
/// the controller plugin verbatim; actuators treat it as operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RobotState {
    /// Fully compliant, no control output.
    Passive = 0,
    /// Measuring sensor means and motor reference offsets.
    Offset = 1,
    /// Learning signal min/max for normalization.
    Calibration = 2,
    /// Controller-specific preparation between calibration and operation.
    Preprocessing = 3,
    /// Normal closed-loop control.
    Operation = 4,
}

impl RobotState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Passive),
            1 => Some(Self::Offset),
            2 => Some(Self::Calibration),
            3 => Some(Self::Preprocessing),
            4 => Some(Self::Operation),
            _ => None,
        }
    }
}

impl Default for RobotState {
    fn default() -> Self {
        Self::Passive
    }
}

/// Per-actuator control state.
///
/// Reached from [`RobotState`] through [`ControlState::from`]: offset and
/// calibration map one-to-one, everything else is operation. `Passive` is
/// only held between construction and the first robot transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlState {
    Passive = 0,
    Offset = 1,
    Calibration = 2,
    Operation = 3,
}

impl ControlState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Passive),
            1 => Some(Self::Offset),
            2 => Some(Self::Calibration),
            3 => Some(Self::Operation),
            _ => None,
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::Passive
    }
}

impl From<RobotState> for ControlState {
    fn from(state: RobotState) -> Self {
        match state {
            RobotState::Offset => Self::Offset,
            RobotState::Calibration => Self::Calibration,
            _ => Self::Operation,
        }
    }
}

/// Signal processor phase.
///
/// In `Offset` no processed output is exposed; in `Calibration` the min/max
/// range widens monotonically; in `Measurement` the offset is subtracted
/// and the normalized output is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignalPhase {
    Offset = 0,
    Calibration = 1,
    Measurement = 2,
}

impl SignalPhase {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Offset),
            1 => Some(Self::Calibration),
            2 => Some(Self::Measurement),
            _ => None,
        }
    }
}

impl Default for SignalPhase {
    fn default() -> Self {
        Self::Measurement
    }
}

impl From<ControlState> for SignalPhase {
    fn from(state: ControlState) -> Self {
        match state {
            ControlState::Offset => Self::Offset,
            ControlState::Calibration => Self::Calibration,
            _ => Self::Measurement,
        }
    }
}
