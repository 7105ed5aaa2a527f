//! Motor: one generation channel with gain and offset handling.
//!
//! The write path is `(setpoint + offset) × gain`, suppressed entirely
//! while the motor is offsetting. The offset itself comes from an optional
//! reference sensor sampled when offsetting ends.

use tracing::warn;

use exo_common::Environment;
use exo_common::config::{self, MotorConfig};
use exo_common::log::SampleLog;
use exo_common::state::SignalPhase;
use exo_hal::{Device, DeviceManager};

use crate::ControlError;
use crate::signal::Sensor;

/// One output channel driving an actuator.
pub struct Motor {
    device: Device,
    channel: u32,
    gain: f64,
    reference: Option<Sensor>,
    offset: f64,
    offsetting: bool,
    log: Option<SampleLog>,
}

impl Motor {
    /// Build the motor named `name` from `config/motor/<name>.toml`.
    pub fn from_name(
        env: &Environment,
        manager: &DeviceManager,
        name: &str,
    ) -> Result<Self, ControlError> {
        let config = config::load_motor(env, name)?;
        Self::from_config(env, manager, name, &config)
    }

    /// Build a motor from an already loaded configuration.
    pub fn from_config(
        env: &Environment,
        manager: &DeviceManager,
        name: &str,
        config: &MotorConfig,
    ) -> Result<Self, ControlError> {
        let device = manager.open(&config.interface.kind, &config.interface.config)?;
        let channel = config.interface.channel;

        let reference = match &config.reference {
            Some(sensor_name) => Some(Sensor::from_name(env, manager, sensor_name)?),
            None => None,
        };

        let log = match &config.log {
            Some(log_config) if log_config.file => {
                match SampleLog::create(env, name, Some(log_config.precision)) {
                    Ok(log) => Some(log),
                    Err(error) => {
                        warn!(motor = name, %error, "sample log unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(Self {
            device,
            channel,
            gain: config.output_gain.gain(),
            reference,
            offset: 0.0,
            offsetting: false,
            log,
        })
    }

    /// Reset the device and claim the output channel.
    pub fn enable(&mut self) -> bool {
        self.device.reset();
        self.device.acquire_output_channel(self.channel)
    }

    /// Return the output channel.
    pub fn disable(&mut self) {
        self.device.release_output_channel(self.channel);
    }

    /// Clear device errors.
    pub fn reset(&mut self) {
        self.device.reset();
    }

    /// Device failure state.
    pub fn has_error(&self) -> bool {
        self.device.has_error()
    }

    /// True while output is suppressed for offset measurement.
    pub fn is_offsetting(&self) -> bool {
        self.offsetting
    }

    /// Enter or leave the offset measurement state.
    ///
    /// Leaving it samples the reference sensor once and keeps that value
    /// as the output offset; entering it zeroes the offset and holds the
    /// output at zero.
    pub fn set_offset(&mut self, enabled: bool) {
        if enabled == self.offsetting {
            return;
        }
        self.offset = 0.0;
        if self.offsetting {
            if let Some(reference) = &mut self.reference {
                self.offset = reference.update();
            }
        }
        self.offsetting = enabled;
        if let Some(reference) = &mut self.reference {
            reference.set_phase(if enabled {
                SignalPhase::Offset
            } else {
                SignalPhase::Measurement
            });
        }
        self.write_control(0.0);
    }

    /// Scale and emit one setpoint, unless offsetting.
    pub fn write_control(&mut self, setpoint: f64) {
        let scaled = (setpoint + self.offset) * self.gain;
        if let Some(log) = &mut self.log {
            log.record(&[setpoint, scaled]);
        }
        if !self.offsetting {
            self.device.write(self.channel, scaled);
        }
    }
}
