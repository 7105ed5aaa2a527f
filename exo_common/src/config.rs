//! Configuration schemas and the TOML loader.
//!
//! Each configured entity (robot, actuator, motor, sensor) lives in its own
//! file under `<root>/config/<kind>/<name>.toml`. Schemas are plain serde
//! structs; validation beyond shape (dimension checks, plugin lookup) is
//! done by the crate that consumes the config.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::consts::DEFAULT_LOG_PRECISION;
use crate::env::{ConfigKind, Environment};
use crate::types::ControlVariable;

/// Errors raised while locating or parsing configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file for the requested entity.
    #[error("no {kind} configuration named '{name}'")]
    NotFound { kind: &'static str, name: String },

    /// Filesystem failure other than absence.
    #[error("reading configuration '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    /// TOML syntax or schema mismatch.
    #[error("parsing configuration '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: Box<toml::de::Error>,
    },
}

// ─── Schemas ────────────────────────────────────────────────────────

/// `config/robot/<name>.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
    pub controller: ControllerConfig,
    #[serde(default)]
    pub actuators: Vec<ActuatorRef>,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

/// Controller selection and its opaque configuration string.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// Controller implementation lookup key.
    #[serde(rename = "type")]
    pub kind: String,
    /// Passed to the controller verbatim.
    #[serde(default)]
    pub config: String,
    /// Control loop period [s]; workspace default when absent.
    #[serde(default)]
    pub time_step: Option<f64>,
}

/// Robot actuator entry: a name resolving to `config/actuators/<name>.toml`
/// or the full actuator table inline.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ActuatorRef {
    Name(String),
    Inline(ActuatorConfig),
}

/// `config/actuators/<name>.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActuatorConfig {
    #[serde(default)]
    pub sensors: Vec<SensorRef>,
    pub motor: MotorRef,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

/// One fused sensor of an actuator.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorRef {
    /// Control variable this sensor observes.
    pub variable: ControlVariable,
    /// Sensor configuration name under `config/sensors/`.
    pub config: String,
    /// Measurement standard deviation fed to the estimator.
    #[serde(default = "default_deviation")]
    pub deviation: f64,
}

/// The actuator's motor binding.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotorRef {
    /// Control variable forwarded as motor setpoint.
    #[serde(default)]
    pub variable: ControlVariable,
    /// Motor configuration name under `config/motor/`.
    pub config: String,
    /// Controller-specific output bound; the core carries it untouched.
    #[serde(default)]
    pub limit: Option<f64>,
}

/// `config/sensors/<name>.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    pub inputs: Vec<InputConfig>,
    /// Arithmetic expression over `in0..inN`; identity of `in0` when absent.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

/// One acquisition channel feeding a sensor.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub interface: InterfaceConfig,
    #[serde(default)]
    pub signal_processing: SignalProcessingConfig,
}

/// Device plugin binding shared by inputs and motors.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    /// Signal-I/O driver lookup key.
    #[serde(rename = "type")]
    pub kind: String,
    /// Driver-specific configuration string.
    #[serde(default)]
    pub config: String,
    pub channel: u32,
}

/// Per-input signal conditioning options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalProcessingConfig {
    #[serde(default)]
    pub rectified: bool,
    #[serde(default)]
    pub normalized: bool,
    /// High-pass cutoff relative to the sampling frequency; ≤ 0 disables.
    #[serde(default)]
    pub min_frequency: f64,
    /// Low-pass cutoff relative to the sampling frequency; ≤ 0 disables.
    #[serde(default)]
    pub max_frequency: f64,
}

/// `config/motor/<name>.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotorConfig {
    pub interface: InterfaceConfig,
    #[serde(default)]
    pub output_gain: GainConfig,
    /// Reference sensor (under `config/sensors/`) sampled while offsetting.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

/// Rational output gain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GainConfig {
    #[serde(default = "default_gain_term")]
    pub multiplier: f64,
    #[serde(default = "default_gain_term")]
    pub divisor: f64,
}

impl GainConfig {
    /// Effective multiplicative gain.
    pub fn gain(&self) -> f64 {
        if self.divisor == 0.0 {
            self.multiplier
        } else {
            self.multiplier / self.divisor
        }
    }
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            divisor: 1.0,
        }
    }
}

/// Optional per-entity sample log settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Write samples to a file (off keeps the entity silent).
    #[serde(default)]
    pub file: bool,
    #[serde(default = "default_precision")]
    pub precision: usize,
}

fn default_deviation() -> f64 {
    1.0
}

fn default_gain_term() -> f64 {
    1.0
}

fn default_precision() -> usize {
    DEFAULT_LOG_PRECISION
}

// ─── Loader ─────────────────────────────────────────────────────────

/// Load the robot configuration `name`.
pub fn load_robot(env: &Environment, name: &str) -> Result<RobotConfig, ConfigError> {
    load(env, ConfigKind::Robot, name)
}

/// Load the actuator configuration `name`.
pub fn load_actuator(env: &Environment, name: &str) -> Result<ActuatorConfig, ConfigError> {
    load(env, ConfigKind::Actuators, name)
}

/// Load the sensor configuration `name`.
pub fn load_sensor(env: &Environment, name: &str) -> Result<SensorConfig, ConfigError> {
    load(env, ConfigKind::Sensors, name)
}

/// Load the motor configuration `name`.
pub fn load_motor(env: &Environment, name: &str) -> Result<MotorConfig, ConfigError> {
    load(env, ConfigKind::Motor, name)
}

fn load<T: serde::de::DeserializeOwned>(
    env: &Environment,
    kind: ConfigKind,
    name: &str,
) -> Result<T, ConfigError> {
    let path = resolve(env, kind, name).ok_or_else(|| ConfigError::NotFound {
        kind: kind.dir_name(),
        name: name.to_string(),
    })?;
    let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        name: name.to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        name: name.to_string(),
        source: Box::new(source),
    })
}

/// Locate a configuration file: `<name>.toml` first, bare `<name>` second.
fn resolve(env: &Environment, kind: ConfigKind, name: &str) -> Option<PathBuf> {
    let dir = env.config_dir(kind);
    let with_ext = dir.join(format!("{name}.toml"));
    if with_ext.is_file() {
        return Some(with_ext);
    }
    let bare = dir.join(name);
    bare.is_file().then_some(bare)
}

/// Names of all robot configurations on disk, extensions stripped, sorted.
pub fn list_robots(env: &Environment) -> Vec<String> {
    let mut names = Vec::new();
    let dir = env.config_dir(ConfigKind::Robot);
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&name);
            if !stem.is_empty() {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    names.dedup();
    names
}
