//! Waveform-generating Signal-I/O backend.
//!
//! Lets a full robot configuration run on a development machine: each
//! acquisition channel produces a deterministic waveform, generation
//! channels store the last written value and can be looped back into
//! reads for closed-loop experiments.
//!
//! The configuration string is a space-separated `key=value` list:
//!
//! ```text
//! wave=sine amplitude=1.5 frequency=0.5 offset=0.2 samples=4 rate=1000
//! ```
//!
//! | Key | Values | Default |
//! |-----|--------|---------|
//! | `wave` | `sine`, `ramp`, `constant`, `loopback` | `sine` |
//! | `amplitude` | f64 | `1.0` |
//! | `frequency` | f64 [Hz] | `1.0` |
//! | `offset` | f64 | `0.0` |
//! | `samples` | samples per read | `1` |
//! | `rate` | intra-read sample rate [Hz] | `1000` |
//!
//! `loopback` channels read back whatever was last written to the same
//! channel number, scaled by `amplitude`.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::time::Instant;

use crate::{HalError, SignalIo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waveform {
    Sine,
    Ramp,
    Constant,
    Loopback,
}

struct SimulationDevice {
    wave: Waveform,
    amplitude: f64,
    frequency: f64,
    offset: f64,
    samples: usize,
    rate: f64,
    started: Instant,
    last_written: HashMap<u32, f64>,
}

/// Parse the configuration string and build a simulation device.
pub fn create(config: &str) -> Result<Box<dyn SignalIo>, HalError> {
    let mut device = SimulationDevice {
        wave: Waveform::Sine,
        amplitude: 1.0,
        frequency: 1.0,
        offset: 0.0,
        samples: 1,
        rate: 1000.0,
        started: Instant::now(),
        last_written: HashMap::new(),
    };

    for pair in config.split_whitespace() {
        let (key, value) = pair.split_once('=').ok_or_else(|| HalError::InitFailed {
            driver: "simulation".into(),
            reason: format!("expected key=value, got '{pair}'"),
        })?;
        let invalid = |reason: String| HalError::InitFailed {
            driver: "simulation".into(),
            reason,
        };
        match key {
            "wave" => {
                device.wave = match value {
                    "sine" => Waveform::Sine,
                    "ramp" => Waveform::Ramp,
                    "constant" => Waveform::Constant,
                    "loopback" => Waveform::Loopback,
                    other => return Err(invalid(format!("unknown waveform '{other}'"))),
                }
            }
            "amplitude" => device.amplitude = parse_f64(value, key)?,
            "frequency" => device.frequency = parse_f64(value, key)?,
            "offset" => device.offset = parse_f64(value, key)?,
            "samples" => {
                device.samples = value
                    .parse::<usize>()
                    .map_err(|_| invalid(format!("bad sample count '{value}'")))?
                    .max(1)
            }
            "rate" => device.rate = parse_f64(value, key)?.max(1.0),
            other => return Err(invalid(format!("unknown option '{other}'"))),
        }
    }

    Ok(Box::new(device))
}

fn parse_f64(value: &str, key: &str) -> Result<f64, HalError> {
    value.parse::<f64>().map_err(|_| HalError::InitFailed {
        driver: "simulation".into(),
        reason: format!("bad numeric value '{value}' for '{key}'"),
    })
}

impl SimulationDevice {
    fn sample_at(&self, channel: u32, t: f64) -> f64 {
        match self.wave {
            Waveform::Sine => self.offset + self.amplitude * (TAU * self.frequency * t).sin(),
            Waveform::Ramp => {
                let period = 1.0 / self.frequency.max(1e-9);
                let phase = (t / period).fract();
                self.offset + self.amplitude * (2.0 * phase - 1.0)
            }
            Waveform::Constant => self.offset + self.amplitude,
            Waveform::Loopback => {
                self.offset + self.amplitude * self.last_written.get(&channel).copied().unwrap_or(0.0)
            }
        }
    }
}

impl SignalIo for SimulationDevice {
    fn reset(&mut self) {
        self.started = Instant::now();
        self.last_written.clear();
    }

    fn has_error(&self) -> bool {
        false
    }

    fn max_input_samples(&self) -> usize {
        self.samples
    }

    fn read(&mut self, channel: u32, out: &mut [f64]) -> usize {
        let n = out.len().min(self.samples);
        let now = self.started.elapsed().as_secs_f64();
        let dt = 1.0 / self.rate;
        // The vector ends at "now": earlier slots are back-dated.
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            let t = now - dt * (n - 1 - i) as f64;
            *slot = self.sample_at(channel, t);
        }
        n
    }

    fn check_input_channel(&mut self, _channel: u32) -> bool {
        true
    }

    fn acquire_output_channel(&mut self, _channel: u32) -> bool {
        true
    }

    fn release_output_channel(&mut self, channel: u32) {
        self.last_written.remove(&channel);
    }

    fn write(&mut self, channel: u32, value: f64) -> bool {
        self.last_written.insert(channel, value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_wave_fills_all_samples() {
        let mut device = create("wave=constant amplitude=2.0 offset=0.5 samples=4").unwrap();
        let mut buf = [0.0; 8];
        assert_eq!(device.read(0, &mut buf), 4);
        for sample in &buf[..4] {
            assert!((sample - 2.5).abs() < 1e-12);
        }
    }

    #[test]
    fn sine_wave_stays_within_amplitude() {
        let mut device = create("wave=sine amplitude=1.0 frequency=50").unwrap();
        let mut buf = [0.0; 1];
        for _ in 0..100 {
            device.read(0, &mut buf);
            assert!(buf[0].abs() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn loopback_reads_last_write() {
        let mut device = create("wave=loopback").unwrap();
        let mut buf = [0.0; 1];
        device.read(3, &mut buf);
        assert_eq!(buf[0], 0.0);
        assert!(device.write(3, 0.75));
        device.read(3, &mut buf);
        assert!((buf[0] - 0.75).abs() < 1e-12);
        // Other channels are unaffected.
        device.read(4, &mut buf);
        assert_eq!(buf[0], 0.0);
    }

    #[test]
    fn malformed_config_is_rejected() {
        assert!(create("wave=triangle").is_err());
        assert!(create("amplitude=abc").is_err());
        assert!(create("garbage").is_err());
    }
}
