//! Per-input signal pipeline.
//!
//! [`filters`] holds the biquad band-pass stages, [`processor`] the phase
//! state machine around them, [`expression`] the compiled arithmetic
//! language, [`input`] one device channel plus its processor, and
//! [`sensor`] the composition of several inputs into one measurement.

pub mod expression;
pub mod filters;
pub mod input;
pub mod processor;
pub mod sensor;

pub use expression::{Expression, ExpressionError};
pub use input::Input;
pub use processor::{ProcessingFlags, SignalProcessor};
pub use sensor::Sensor;
