//! Actuator: one motor, a sensor suite and the motion estimator behind a
//! four-state control state machine.
//!
//! `get_measures` fuses the sensors into a `DofVariables` estimate each
//! tick; `set_setpoints` forwards the entry selected by the configured
//! control mode to the motor, but only in operation.

use tracing::{debug, warn};

use exo_common::Environment;
use exo_common::config::{self, ActuatorConfig, ActuatorRef};
use exo_common::log::SampleLog;
use exo_common::state::{ControlState, SignalPhase};
use exo_common::types::{ControlVariable, DofVariables, CONTROL_VARS_NUMBER};
use exo_hal::DeviceManager;

use crate::kalman::KalmanFilter;
use crate::motor::Motor;
use crate::signal::Sensor;
use crate::ControlError;

/// One degree of freedom of hardware.
pub struct Actuator {
    name: String,
    state: ControlState,
    mode: ControlVariable,
    motor: Motor,
    sensors: Vec<Sensor>,
    filter: KalmanFilter,
    log: Option<SampleLog>,
    fused: [f64; CONTROL_VARS_NUMBER],
}

impl Actuator {
    /// Resolve an actuator reference: a name under `config/actuators/` or
    /// an inline configuration table.
    pub fn from_ref(
        env: &Environment,
        manager: &DeviceManager,
        reference: &ActuatorRef,
        fallback_name: &str,
    ) -> Result<Self, ControlError> {
        match reference {
            ActuatorRef::Name(name) => Self::from_name(env, manager, name),
            ActuatorRef::Inline(config) => Self::from_config(env, manager, fallback_name, config),
        }
    }

    /// Build the actuator named `name` from `config/actuators/<name>.toml`.
    pub fn from_name(
        env: &Environment,
        manager: &DeviceManager,
        name: &str,
    ) -> Result<Self, ControlError> {
        let config = config::load_actuator(env, name)?;
        Self::from_config(env, manager, name, &config)
    }

    /// Build an actuator from an already loaded configuration.
    ///
    /// The estimator's measurement count is fixed here; each sensor's
    /// measurement row binds to its declared variable.
    pub fn from_config(
        env: &Environment,
        manager: &DeviceManager,
        name: &str,
        config: &ActuatorConfig,
    ) -> Result<Self, ControlError> {
        let mut filter = KalmanFilter::new(CONTROL_VARS_NUMBER, config.sensors.len());
        let mut sensors = Vec::with_capacity(config.sensors.len());
        for (index, sensor_ref) in config.sensors.iter().enumerate() {
            sensors.push(Sensor::from_name(env, manager, &sensor_ref.config)?);
            filter.set_measure_weight(index, sensor_ref.variable.index(), sensor_ref.deviation);
        }

        let motor = Motor::from_name(env, manager, &config.motor.config)?;

        let log = match &config.log {
            Some(log_config) if log_config.file => {
                match SampleLog::create(env, name, Some(log_config.precision)) {
                    Ok(log) => Some(log),
                    Err(error) => {
                        warn!(actuator = name, %error, "sample log unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        filter.reset();
        debug!(
            actuator = name,
            sensors = sensors.len(),
            mode = ?config.motor.variable,
            "actuator ready"
        );

        Ok(Self {
            name: name.to_string(),
            state: ControlState::Passive,
            mode: config.motor.variable,
            motor,
            sensors,
            filter,
            log,
            fused: [0.0; CONTROL_VARS_NUMBER],
        })
    }

    /// Actuator name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current control state.
    pub fn control_state(&self) -> ControlState {
        self.state
    }

    /// Bring the motor up.
    pub fn enable(&mut self) -> bool {
        self.motor.enable()
    }

    /// Write a zero setpoint, then release the motor.
    pub fn disable(&mut self) {
        self.motor.write_control(0.0);
        self.motor.disable();
    }

    /// Transition the actuator state machine.
    ///
    /// No-ops and out-of-range values are refused. Offset puts the motor
    /// into its offsetting hold and the sensors into their offset phase;
    /// calibration and operation restore motor output and move the
    /// sensors along.
    pub fn set_control_state(&mut self, new_state: ControlState) -> bool {
        if new_state == self.state {
            return false;
        }
        debug!(actuator = %self.name, state = ?new_state, "actuator state change");

        let phase = SignalPhase::from(new_state);
        for sensor in &mut self.sensors {
            sensor.set_phase(phase);
        }
        self.motor.set_offset(new_state == ControlState::Offset);

        self.state = new_state;
        true
    }

    /// Fuse the sensor suite into `out` for a tick of length `dt`.
    ///
    /// Returns false when the estimator correction was skipped; `out` is
    /// then the prediction.
    pub fn get_measures(&mut self, dt: f64, out: &mut DofVariables) -> bool {
        const POSITION: usize = ControlVariable::Position as usize;
        const VELOCITY: usize = ControlVariable::Velocity as usize;
        const ACCELERATION: usize = ControlVariable::Acceleration as usize;

        self.filter.set_transition_factor(POSITION, VELOCITY, dt);
        self.filter
            .set_transition_factor(POSITION, ACCELERATION, dt * dt / 2.0);
        self.filter.set_transition_factor(VELOCITY, ACCELERATION, dt);

        for (index, sensor) in self.sensors.iter_mut().enumerate() {
            self.filter.set_measure(index, sensor.update());
        }

        self.filter.predict(&mut self.fused);
        let corrected = self.filter.update(&mut self.fused);

        out.position = self.fused[POSITION];
        out.velocity = self.fused[VELOCITY];
        out.acceleration = self.fused[ACCELERATION];
        out.force = self.fused[ControlVariable::Force as usize];

        if let Some(log) = &mut self.log {
            log.record(&self.fused);
        }

        corrected
    }

    /// Forward the setpoint entry selected by the control mode to the
    /// motor (operation only). Returns the chosen scalar.
    pub fn set_setpoints(&mut self, setpoints: &DofVariables) -> f64 {
        let value = setpoints.variable(self.mode);
        if self.state == ControlState::Operation {
            self.motor.write_control(value);
        }
        value
    }

    /// True when the motor or any sensor reports a device failure.
    pub fn has_error(&self) -> bool {
        self.motor.has_error() || self.sensors.iter().any(Sensor::has_error)
    }

    /// Clear devices, processors and the estimator.
    pub fn reset(&mut self) {
        for sensor in &mut self.sensors {
            sensor.reset();
        }
        self.motor.reset();
        self.filter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_common::config::{MotorRef, SensorRef};
    use exo_common::env::ConfigKind;
    use std::fs;

    /// Writes a one-sensor, one-motor actuator config tree over mock
    /// devices and returns the environment rooted there.
    fn actuator_fixture(tag: &str) -> (tempfile::TempDir, Environment, ActuatorConfig) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::new(dir.path(), dir.path().join("logs"));
        for kind in [ConfigKind::Sensors, ConfigKind::Motor] {
            fs::create_dir_all(env.config_dir(kind)).unwrap();
        }
        fs::write(
            env.config_dir(ConfigKind::Sensors).join(format!("{tag}_enc.toml")),
            format!(
                "[[inputs]]\ninterface = {{ type = \"mock\", config = \"{tag}-enc\", channel = 0 }}\n"
            ),
        )
        .unwrap();
        fs::write(
            env.config_dir(ConfigKind::Motor).join(format!("{tag}_mot.toml")),
            format!(
                "interface = {{ type = \"mock\", config = \"{tag}-mot\", channel = 0 }}\n"
            ),
        )
        .unwrap();
        let config = ActuatorConfig {
            sensors: vec![SensorRef {
                variable: ControlVariable::Position,
                config: format!("{tag}_enc"),
                deviation: 0.1,
            }],
            motor: MotorRef {
                variable: ControlVariable::Force,
                config: format!("{tag}_mot"),
                limit: None,
            },
            log: None,
        };
        (dir, env, config)
    }

    #[test]
    fn state_machine_rejects_noop_and_fans_out() {
        let (_dir, env, config) = actuator_fixture("act-sm");
        let manager = DeviceManager::default();
        let mut actuator = Actuator::from_config(&env, &manager, "act-sm", &config).unwrap();

        assert!(actuator.set_control_state(ControlState::Offset));
        assert!(!actuator.set_control_state(ControlState::Offset));
        assert_eq!(actuator.control_state(), ControlState::Offset);
        assert!(actuator.set_control_state(ControlState::Calibration));
        assert!(actuator.set_control_state(ControlState::Operation));
    }

    #[test]
    fn no_device_writes_while_offsetting() {
        let (_dir, env, config) = actuator_fixture("act-off");
        let manager = DeviceManager::default();
        let state = exo_hal::drivers::mock::state("act-off-mot");
        let mut actuator = Actuator::from_config(&env, &manager, "act-off", &config).unwrap();
        assert!(actuator.enable());
        actuator.set_control_state(ControlState::Offset);
        let writes = state.write_count();
        let setpoints = DofVariables {
            force: 2.0,
            ..DofVariables::default()
        };
        for _ in 0..100 {
            actuator.set_setpoints(&setpoints);
        }
        assert_eq!(state.write_count(), writes);
    }

    #[test]
    fn setpoint_selects_control_mode_entry() {
        let (_dir, env, config) = actuator_fixture("act-mode");
        let manager = DeviceManager::default();
        let state = exo_hal::drivers::mock::state("act-mode-mot");
        let mut actuator = Actuator::from_config(&env, &manager, "act-mode", &config).unwrap();
        assert!(actuator.enable());
        actuator.set_control_state(ControlState::Operation);

        let setpoints = DofVariables {
            position: 9.0,
            force: -1.5,
            ..DofVariables::default()
        };
        // Motor variable is FORCE in the fixture.
        assert_eq!(actuator.set_setpoints(&setpoints), -1.5);
        assert_eq!(state.last_write(), Some((0, -1.5)));
    }

    #[test]
    fn measures_track_the_position_sensor() {
        let (_dir, env, config) = actuator_fixture("act-meas");
        let manager = DeviceManager::default();
        exo_hal::drivers::mock::state("act-meas-enc").set_sample(1.25);
        let mut actuator = Actuator::from_config(&env, &manager, "act-meas", &config).unwrap();
        let mut measures = DofVariables::default();
        for _ in 0..300 {
            assert!(actuator.get_measures(0.005, &mut measures));
        }
        assert!((measures.position - 1.25).abs() < 0.05, "{}", measures.position);
        // Pass-through fields are untouched.
        assert_eq!(measures.stiffness, 0.0);
    }

    #[test]
    fn error_recovery_via_reset() {
        let (_dir, env, config) = actuator_fixture("act-err");
        let manager = DeviceManager::default();
        let enc = exo_hal::drivers::mock::state("act-err-enc");
        let mut actuator = Actuator::from_config(&env, &manager, "act-err", &config).unwrap();
        enc.set_failing(true);
        assert!(actuator.has_error());
        actuator.reset();
        assert!(!actuator.has_error());
    }
}
