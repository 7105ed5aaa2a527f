//! One acquisition channel and its signal processor.

use exo_common::config::InputConfig;
use exo_common::state::SignalPhase;
use exo_hal::{Device, DeviceManager};

use super::processor::{ProcessingFlags, SignalProcessor};
use crate::ControlError;

/// A device channel producing one conditioned scalar per update.
pub struct Input {
    device: Device,
    channel: u32,
    buffer: Vec<f64>,
    processor: SignalProcessor,
}

impl Input {
    /// Open the configured device channel and build its processor.
    ///
    /// The sample buffer capacity is fixed here at the device's
    /// `max_input_samples`; the update path never reallocates.
    pub fn new(manager: &DeviceManager, config: &InputConfig) -> Result<Self, ControlError> {
        let device = manager.open(&config.interface.kind, &config.interface.config)?;
        let channel = config.interface.channel;
        device.acquire_input_channel(channel)?;

        let mut flags = ProcessingFlags::empty();
        if config.signal_processing.rectified {
            flags |= ProcessingFlags::RECTIFY;
        }
        if config.signal_processing.normalized {
            flags |= ProcessingFlags::NORMALIZE;
        }
        let processor = SignalProcessor::new(
            flags,
            config.signal_processing.min_frequency,
            config.signal_processing.max_frequency,
        );

        let buffer = vec![0.0; device.max_input_samples().max(1)];
        device.reset();

        Ok(Self {
            device,
            channel,
            buffer,
            processor,
        })
    }

    /// Acquire one sample vector and run it through the processor.
    pub fn update(&mut self) -> f64 {
        let count = self.device.read(self.channel, &mut self.buffer);
        let count = count.min(self.buffer.len());
        self.processor.update(&self.buffer[..count])
    }

    /// Device failure state.
    pub fn has_error(&self) -> bool {
        self.device.has_error()
    }

    /// Forward a phase change to the processor.
    pub fn set_phase(&mut self, phase: SignalPhase) {
        self.processor.set_phase(phase);
    }

    /// Clear processor accumulators and the device.
    pub fn reset(&mut self) {
        self.processor.reset();
        self.device.reset();
    }

    /// Read-only processor access, for diagnostics and tests.
    pub fn processor(&self) -> &SignalProcessor {
        &self.processor
    }
}

impl Drop for Input {
    fn drop(&mut self) {
        self.device.release_input_channel(self.channel);
    }
}
