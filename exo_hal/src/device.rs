//! Shared device handles and channel usage accounting.
//!
//! Two inputs naming the same `(driver, config)` pair talk to one physical
//! device, so the manager deduplicates live instances. The [`Device`]
//! wrapper serializes driver calls and enforces the channel rules the
//! capability promises: at most [`MAX_INPUT_CHANNEL_READERS`] concurrent
//! readers per acquisition channel, exclusive ownership of generation
//! channels.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use exo_common::consts::MAX_INPUT_CHANNEL_READERS;

use crate::registry::DriverRegistry;
use crate::{HalError, SignalIo};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeviceKey {
    driver: String,
    config: String,
}

struct DeviceInner {
    key: DeviceKey,
    io: Mutex<Box<dyn SignalIo>>,
    usage: Mutex<ChannelUsage>,
}

#[derive(Default)]
struct ChannelUsage {
    /// Reader count per acquisition channel.
    readers: HashMap<u32, usize>,
    /// Generation channels currently owned.
    outputs: HashSet<u32>,
}

/// Cloneable handle to one open device.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// `driver/config` identity, for diagnostics.
    pub fn name(&self) -> String {
        let key = &self.inner.key;
        if key.config.is_empty() {
            key.driver.clone()
        } else {
            format!("{}/{}", key.driver, key.config)
        }
    }

    /// Register a reader on an acquisition channel.
    ///
    /// # Errors
    /// `ChannelUnavailable` when the driver rejects the channel or all
    /// reader slots are taken.
    pub fn acquire_input_channel(&self, channel: u32) -> Result<(), HalError> {
        let mut usage = self.inner.usage.lock();
        let count = usage.readers.entry(channel).or_insert(0);
        if *count >= MAX_INPUT_CHANNEL_READERS
            || !self.inner.io.lock().check_input_channel(channel)
        {
            return Err(HalError::ChannelUnavailable {
                device: self.name(),
                channel,
            });
        }
        *count += 1;
        Ok(())
    }

    /// Drop a reader registration.
    pub fn release_input_channel(&self, channel: u32) {
        let mut usage = self.inner.usage.lock();
        if let Some(count) = usage.readers.get_mut(&channel) {
            *count = count.saturating_sub(1);
        }
    }

    /// Claim exclusive ownership of a generation channel.
    pub fn acquire_output_channel(&self, channel: u32) -> bool {
        let mut usage = self.inner.usage.lock();
        if usage.outputs.contains(&channel) {
            return false;
        }
        if !self.inner.io.lock().acquire_output_channel(channel) {
            return false;
        }
        usage.outputs.insert(channel);
        true
    }

    /// Return a generation channel.
    pub fn release_output_channel(&self, channel: u32) {
        let mut usage = self.inner.usage.lock();
        if usage.outputs.remove(&channel) {
            self.inner.io.lock().release_output_channel(channel);
        }
    }

    /// Read one sample vector; returns the number of samples filled.
    pub fn read(&self, channel: u32, out: &mut [f64]) -> usize {
        self.inner.io.lock().read(channel, out)
    }

    /// Write one scalar to an owned output channel.
    pub fn write(&self, channel: u32, value: f64) -> bool {
        self.inner.io.lock().write(channel, value)
    }

    /// Clear device errors and transient state.
    pub fn reset(&self) {
        self.inner.io.lock().reset();
    }

    /// True when the backend reports a failure.
    pub fn has_error(&self) -> bool {
        self.inner.io.lock().has_error()
    }

    /// Samples each `read` call fills per channel.
    pub fn max_input_samples(&self) -> usize {
        self.inner.io.lock().max_input_samples()
    }
}

/// Opens devices by lookup key and deduplicates live instances.
pub struct DeviceManager {
    registry: DriverRegistry,
    open: Mutex<HashMap<DeviceKey, Weak<DeviceInner>>>,
}

impl DeviceManager {
    /// Manager over the given driver registry.
    pub fn new(registry: DriverRegistry) -> Self {
        Self {
            registry,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or share) the device identified by `(driver, config)`.
    pub fn open(&self, driver: &str, config: &str) -> Result<Device, HalError> {
        let key = DeviceKey {
            driver: driver.to_string(),
            config: config.to_string(),
        };
        let mut open = self.open.lock();
        if let Some(existing) = open.get(&key).and_then(Weak::upgrade) {
            return Ok(Device { inner: existing });
        }
        let io = self.registry.create(driver, config)?;
        debug!(driver, config, "signal-io device opened");
        let inner = Arc::new(DeviceInner {
            key: key.clone(),
            io: Mutex::new(io),
            usage: Mutex::new(ChannelUsage::default()),
        });
        open.retain(|_, weak| weak.strong_count() > 0);
        open.insert(key, Arc::downgrade(&inner));
        Ok(Device { inner })
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new(DriverRegistry::with_builtins())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DeviceManager {
        DeviceManager::default()
    }

    #[test]
    fn same_key_shares_one_instance() {
        let manager = manager();
        let a = manager.open("mock", "shared").unwrap();
        let b = manager.open("mock", "shared").unwrap();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        let c = manager.open("mock", "other").unwrap();
        assert!(!Arc::ptr_eq(&a.inner, &c.inner));
    }

    #[test]
    fn reader_slots_are_bounded() {
        let manager = manager();
        let device = manager.open("dummy", "").unwrap();
        for _ in 0..MAX_INPUT_CHANNEL_READERS {
            device.acquire_input_channel(0).unwrap();
        }
        assert!(matches!(
            device.acquire_input_channel(0),
            Err(HalError::ChannelUnavailable { channel: 0, .. })
        ));
        device.release_input_channel(0);
        device.acquire_input_channel(0).unwrap();
    }

    #[test]
    fn output_channels_are_exclusive() {
        let manager = manager();
        let device = manager.open("dummy", "").unwrap();
        assert!(device.acquire_output_channel(2));
        assert!(!device.acquire_output_channel(2));
        device.release_output_channel(2);
        assert!(device.acquire_output_channel(2));
    }

    #[test]
    fn dropped_devices_reopen_fresh() {
        let manager = manager();
        let first = manager.open("dummy", "a").unwrap();
        assert!(first.acquire_output_channel(0));
        drop(first);
        let second = manager.open("dummy", "a").unwrap();
        assert!(second.acquire_output_channel(0));
    }
}
