//! Driver registry for Signal-I/O backends.
//!
//! Maps the lookup keys robot configurations reference (the names that
//! would be `plugins/signal_io/<name>` paths in a dynamically loaded
//! deployment) to statically linked driver factories. Constructed at
//! startup and passed by value — no global state.

use std::collections::HashMap;

use crate::drivers;
use crate::{HalError, SignalIo};

/// Factory function type: builds a driver instance from its configuration
/// string.
pub type DriverFactory = fn(&str) -> Result<Box<dyn SignalIo>, HalError>;

/// Registry of available Signal-I/O drivers.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with all built-in drivers present.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("dummy", drivers::dummy::create);
        registry.register("simulation", drivers::simulation::create);
        registry.register("mock", drivers::mock::create);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.insert(name, factory).is_some() {
            panic!("signal-io driver '{name}' is already registered");
        }
    }

    /// Instantiate a driver by lookup key.
    ///
    /// # Errors
    /// `HalError::DriverNotFound` for unknown keys; the factory's own
    /// error when the configuration string is rejected.
    pub fn create(&self, name: &str, config: &str) -> Result<Box<dyn SignalIo>, HalError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))?;
        factory(config)
    }

    /// All registered lookup keys.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_present() {
        let registry = DriverRegistry::with_builtins();
        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(names, vec!["dummy", "mock", "simulation"]);
    }

    #[test]
    fn unknown_driver_is_an_error() {
        let registry = DriverRegistry::with_builtins();
        assert!(matches!(
            registry.create("ethercat", ""),
            Err(HalError::DriverNotFound(_))
        ));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let mut registry = DriverRegistry::new();
        registry.register("dummy", drivers::dummy::create);
        registry.register("dummy", drivers::dummy::create);
    }
}
