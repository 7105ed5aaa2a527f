//! Runtime environment threaded through constructors.
//!
//! Replaces the process-wide base directory and logging globals of older
//! control stacks with an explicit value: root directory for configuration
//! lookup, log directory, optional user name for log file naming, and the
//! process start instant used as the time base for sample logs.

use std::path::{Path, PathBuf};
use std::time::Instant;

/// Configuration subdirectory kinds, in the fixed on-disk layout
/// `<root>/config/<kind>/<name>.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Robot,
    Actuators,
    Motor,
    Sensors,
}

impl ConfigKind {
    /// Directory name under `<root>/config/`.
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Robot => "robot",
            Self::Actuators => "actuators",
            Self::Motor => "motor",
            Self::Sensors => "sensors",
        }
    }
}

/// Explicit runtime environment.
#[derive(Debug, Clone)]
pub struct Environment {
    root: PathBuf,
    log_dir: PathBuf,
    user: Option<String>,
    started: Instant,
}

impl Environment {
    /// Create an environment rooted at `root`, logging under `log_dir`.
    pub fn new(root: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            log_dir: log_dir.into(),
            user: None,
            started: Instant::now(),
        }
    }

    /// Root directory containing `config/`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory sample logs are written to.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Directory for one configuration kind.
    pub fn config_dir(&self, kind: ConfigKind) -> PathBuf {
        self.root.join("config").join(kind.dir_name())
    }

    /// User name prefixed to sample log files, if set.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Set the user name used for subsequently created sample logs.
    pub fn set_user(&mut self, user: impl Into<String>) {
        let user = user.into();
        self.user = if user.is_empty() { None } else { Some(user) };
    }

    /// Seconds elapsed since the environment was created.
    ///
    /// Time base for every sample log line.
    pub fn elapsed_s(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(".", "./logs")
    }
}
