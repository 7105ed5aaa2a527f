//! Sensor: several inputs composed through one expression.

use tracing::warn;

use exo_common::Environment;
use exo_common::config::{self, SensorConfig};
use exo_common::log::SampleLog;
use exo_common::state::SignalPhase;
use exo_hal::DeviceManager;

use super::expression::Expression;
use super::input::Input;
use crate::ControlError;

/// Names the expression language binds sensor inputs to.
pub const INPUT_VARIABLE_NAMES: [&str; 6] = ["in0", "in1", "in2", "in3", "in4", "in5"];

/// One scalar measurement source: M inputs fused by an expression.
pub struct Sensor {
    inputs: Vec<Input>,
    values: Vec<f64>,
    expression: Expression,
    log: Option<SampleLog>,
    log_line: Vec<f64>,
}

impl Sensor {
    /// Build the sensor named `name` from `config/sensors/<name>.toml`.
    pub fn from_name(
        env: &Environment,
        manager: &DeviceManager,
        name: &str,
    ) -> Result<Self, ControlError> {
        let config = config::load_sensor(env, name)?;
        Self::from_config(env, manager, name, &config)
    }

    /// Build a sensor from an already loaded configuration.
    pub fn from_config(
        env: &Environment,
        manager: &DeviceManager,
        name: &str,
        config: &SensorConfig,
    ) -> Result<Self, ControlError> {
        let mut inputs = Vec::with_capacity(config.inputs.len());
        for input_config in &config.inputs {
            inputs.push(Input::new(manager, input_config)?);
        }

        let bound = &INPUT_VARIABLE_NAMES[..config.inputs.len().min(INPUT_VARIABLE_NAMES.len())];
        let expression = match &config.output {
            Some(source) => Expression::compile(source, bound).unwrap_or_else(|error| {
                warn!(sensor = name, %error, "output expression rejected, falling back to in0");
                Expression::identity()
            }),
            None => Expression::identity(),
        };

        let log = match &config.log {
            Some(log_config) if log_config.file => {
                match SampleLog::create(env, name, Some(log_config.precision)) {
                    Ok(log) => Some(log),
                    Err(error) => {
                        warn!(sensor = name, %error, "sample log unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        let count = inputs.len();
        Ok(Self {
            inputs,
            values: vec![0.0; count],
            expression,
            log,
            log_line: vec![0.0; count + 1],
        })
    }

    /// Update every input, evaluate the expression, log, return the scalar.
    pub fn update(&mut self) -> f64 {
        for (value, input) in self.values.iter_mut().zip(self.inputs.iter_mut()) {
            *value = input.update();
        }
        let output = self.expression.eval(&self.values);
        if let Some(log) = &mut self.log {
            self.log_line[..self.values.len()].copy_from_slice(&self.values);
            self.log_line[self.values.len()] = output;
            log.record(&self.log_line);
        }
        output
    }

    /// Fan a phase change out to every input.
    pub fn set_phase(&mut self, phase: SignalPhase) {
        for input in &mut self.inputs {
            input.set_phase(phase);
        }
    }

    /// True when any input's device failed.
    pub fn has_error(&self) -> bool {
        self.inputs.iter().any(Input::has_error)
    }

    /// Reset every input (processor and device).
    pub fn reset(&mut self) {
        for input in &mut self.inputs {
            input.reset();
        }
    }

    /// Number of composed inputs.
    pub fn inputs_number(&self) -> usize {
        self.inputs.len()
    }

    /// Input access for diagnostics and tests.
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_common::config::{InputConfig, InterfaceConfig, SignalProcessingConfig};

    fn sensor_config(inputs: &[(&str, &str)], output: Option<&str>) -> SensorConfig {
        SensorConfig {
            inputs: inputs
                .iter()
                .map(|(kind, config)| InputConfig {
                    interface: InterfaceConfig {
                        kind: kind.to_string(),
                        config: config.to_string(),
                        channel: 0,
                    },
                    signal_processing: SignalProcessingConfig::default(),
                })
                .collect(),
            output: output.map(str::to_string),
            log: None,
        }
    }

    #[test]
    fn expression_composes_inputs() {
        let env = Environment::default();
        let manager = DeviceManager::default();
        exo_hal::drivers::mock::state("sens-a").set_sample(2.0);
        exo_hal::drivers::mock::state("sens-b").set_sample(0.5);
        let config = sensor_config(&[("mock", "sens-a"), ("mock", "sens-b")], Some("in0 - in1"));
        let mut sensor = Sensor::from_config(&env, &manager, "diff", &config).unwrap();
        assert!((sensor.update() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn default_output_is_first_input() {
        let env = Environment::default();
        let manager = DeviceManager::default();
        exo_hal::drivers::mock::state("sens-first").set_sample(0.25);
        let config = sensor_config(&[("mock", "sens-first"), ("dummy", "")], None);
        let mut sensor = Sensor::from_config(&env, &manager, "first", &config).unwrap();
        assert_eq!(sensor.update(), 0.25);
    }

    #[test]
    fn bad_expression_falls_back_to_identity() {
        let env = Environment::default();
        let manager = DeviceManager::default();
        exo_hal::drivers::mock::state("sens-bad").set_sample(1.5);
        let config = sensor_config(&[("mock", "sens-bad")], Some("in0 +"));
        let mut sensor = Sensor::from_config(&env, &manager, "bad", &config).unwrap();
        assert_eq!(sensor.update(), 1.5);
    }

    #[test]
    fn phase_fans_out_to_all_inputs() {
        let env = Environment::default();
        let manager = DeviceManager::default();
        exo_hal::drivers::mock::state("sens-ph1").set_sample(1.0);
        exo_hal::drivers::mock::state("sens-ph2").set_sample(2.0);
        let config = sensor_config(&[("mock", "sens-ph1"), ("mock", "sens-ph2")], Some("in0+in1"));
        let mut sensor = Sensor::from_config(&env, &manager, "phase", &config).unwrap();
        sensor.set_phase(SignalPhase::Offset);
        for _ in 0..3 {
            // Each input exposes its running offset estimate: 1 + 2.
            assert!((sensor.update() - 3.0).abs() < 1e-12);
        }
        sensor.set_phase(SignalPhase::Measurement);
        assert!(sensor.update().abs() < 1e-12);
    }

    #[test]
    fn error_is_or_over_inputs() {
        let env = Environment::default();
        let manager = DeviceManager::default();
        let failing = exo_hal::drivers::mock::state("sens-err");
        let config = sensor_config(&[("dummy", ""), ("mock", "sens-err")], None);
        let sensor = Sensor::from_config(&env, &manager, "err", &config).unwrap();
        assert!(!sensor.has_error());
        failing.set_failing(true);
        assert!(sensor.has_error());
        failing.set_failing(false);
    }
}
