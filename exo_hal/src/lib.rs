//! Signal-I/O capability: the uniform device boundary of the EXO stack.
//!
//! Device backends implement [`SignalIo`]; the [`registry`] maps lookup
//! keys (the names robot configurations reference) to statically linked
//! driver factories; the [`device`] layer deduplicates open devices and
//! enforces channel usage rules on top of whatever the driver allows.
//!
//! # Capability contract
//!
//! | Operation | Semantics |
//! |-----------|-----------|
//! | `read` | Fill up to `max_input_samples` samples for one channel |
//! | `write` | Emit one scalar on one output channel |
//! | `check_input_channel` | Channel exists and accepts another reader |
//! | `acquire/release_output_channel` | Exclusive generation ownership |
//! | `reset` | Clear errors and transient device state |
//!
//! Drivers are called with the device lock held; a driver never needs its
//! own synchronization for calls on one device instance.

pub mod device;
pub mod drivers;
pub mod registry;

use thiserror::Error;

pub use device::{Device, DeviceManager};
pub use registry::DriverRegistry;

/// Errors raised by the Signal-I/O layer.
#[derive(Debug, Error)]
pub enum HalError {
    /// No driver registered under the requested lookup key.
    #[error("signal-io driver not found: {0}")]
    DriverNotFound(String),

    /// Driver rejected its configuration string.
    #[error("signal-io driver '{driver}' init failed: {reason}")]
    InitFailed { driver: String, reason: String },

    /// Input channel missing or its reader slots are exhausted.
    #[error("input channel {channel} unavailable on device '{device}'")]
    ChannelUnavailable { device: String, channel: u32 },
}

/// Interface every signal acquisition/generation backend implements.
///
/// One instance per opened device. All calls are serialized by the
/// [`device::Device`] wrapper.
pub trait SignalIo: Send {
    /// Clear errors and transient acquisition state.
    fn reset(&mut self);

    /// True when the device is in a failed state.
    fn has_error(&self) -> bool;

    /// Samples filled per channel by each `read` call.
    fn max_input_samples(&self) -> usize;

    /// Read one sample vector; returns the number of samples written to
    /// `out` (0 on failure).
    fn read(&mut self, channel: u32, out: &mut [f64]) -> usize;

    /// True when `channel` exists and can accept another reader.
    fn check_input_channel(&mut self, channel: u32) -> bool;

    /// Claim an output channel for generation.
    fn acquire_output_channel(&mut self, channel: u32) -> bool;

    /// Return a previously claimed output channel.
    fn release_output_channel(&mut self, channel: u32);

    /// Write one scalar to an output channel; false on failure.
    fn write(&mut self, channel: u32, value: f64) -> bool;
}
