//! Inert Signal-I/O backend.
//!
//! Every channel exists, every read yields one zero sample, every write is
//! accepted and discarded. Useful as a placeholder binding for actuators
//! whose hardware is absent.

use crate::{HalError, SignalIo};

struct DummyDevice;

/// Build a dummy device; the configuration string is ignored.
pub fn create(_config: &str) -> Result<Box<dyn SignalIo>, HalError> {
    Ok(Box::new(DummyDevice))
}

impl SignalIo for DummyDevice {
    fn reset(&mut self) {}

    fn has_error(&self) -> bool {
        false
    }

    fn max_input_samples(&self) -> usize {
        1
    }

    fn read(&mut self, _channel: u32, out: &mut [f64]) -> usize {
        if out.is_empty() {
            return 0;
        }
        out[0] = 0.0;
        1
    }

    fn check_input_channel(&mut self, _channel: u32) -> bool {
        true
    }

    fn acquire_output_channel(&mut self, _channel: u32) -> bool {
        true
    }

    fn release_output_channel(&mut self, _channel: u32) {}

    fn write(&mut self, _channel: u32, _value: f64) -> bool {
        true
    }
}
