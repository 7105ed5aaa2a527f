//! Scripted Signal-I/O backend for tests.
//!
//! Devices are identified by their configuration string; the state behind
//! a given string is shared between the driver instance and any test that
//! asks for it via [`state`], so a test can script sample values and
//! observe write/reset traffic without holding the device itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use crate::{HalError, SignalIo};

/// Observable state shared between a mock device and its test.
pub struct MockState {
    /// Value every read fills the sample buffer with.
    sample: Mutex<f64>,
    /// Samples per read call.
    samples_per_read: Mutex<usize>,
    /// Total successful writes.
    write_count: AtomicU64,
    /// Last `(channel, value)` written.
    last_write: Mutex<Option<(u32, f64)>>,
    /// Total reset calls.
    reset_count: AtomicU64,
    /// When set, `has_error` reports failure and reads return nothing.
    failing: AtomicBool,
}

impl MockState {
    fn new() -> Self {
        Self {
            sample: Mutex::new(0.0),
            samples_per_read: Mutex::new(1),
            write_count: AtomicU64::new(0),
            last_write: Mutex::new(None),
            reset_count: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Script the value subsequent reads return.
    pub fn set_sample(&self, value: f64) {
        *self.sample.lock() = value;
    }

    /// Script how many samples each read fills.
    pub fn set_samples_per_read(&self, count: usize) {
        *self.samples_per_read.lock() = count.max(1);
    }

    /// Put the device into (or out of) a failed state.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Channel and value of the most recent write.
    pub fn last_write(&self) -> Option<(u32, f64)> {
        *self.last_write.lock()
    }

    /// Reset calls so far.
    pub fn reset_count(&self) -> u64 {
        self.reset_count.load(Ordering::SeqCst)
    }
}

static STATES: LazyLock<Mutex<HashMap<String, Arc<MockState>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Shared state behind the mock device identified by `config`.
///
/// Creates the state if no device with that configuration exists yet, so
/// tests may script values before the device is opened.
pub fn state(config: &str) -> Arc<MockState> {
    let mut states = STATES.lock();
    states
        .entry(config.to_string())
        .or_insert_with(|| Arc::new(MockState::new()))
        .clone()
}

struct MockDevice {
    state: Arc<MockState>,
}

/// Build a mock device bound to the shared state for `config`.
pub fn create(config: &str) -> Result<Box<dyn SignalIo>, HalError> {
    Ok(Box::new(MockDevice {
        state: state(config),
    }))
}

impl SignalIo for MockDevice {
    fn reset(&mut self) {
        self.state.reset_count.fetch_add(1, Ordering::SeqCst);
        self.state.failing.store(false, Ordering::SeqCst);
    }

    fn has_error(&self) -> bool {
        self.state.failing.load(Ordering::SeqCst)
    }

    fn max_input_samples(&self) -> usize {
        *self.state.samples_per_read.lock()
    }

    fn read(&mut self, _channel: u32, out: &mut [f64]) -> usize {
        if self.state.failing.load(Ordering::SeqCst) {
            return 0;
        }
        let value = *self.state.sample.lock();
        let n = out.len().min(*self.state.samples_per_read.lock());
        for slot in out.iter_mut().take(n) {
            *slot = value;
        }
        n
    }

    fn check_input_channel(&mut self, _channel: u32) -> bool {
        true
    }

    fn acquire_output_channel(&mut self, _channel: u32) -> bool {
        true
    }

    fn release_output_channel(&mut self, _channel: u32) {}

    fn write(&mut self, channel: u32, value: f64) -> bool {
        if self.state.failing.load(Ordering::SeqCst) {
            return false;
        }
        self.state.write_count.fetch_add(1, Ordering::SeqCst);
        *self.state.last_write.lock() = Some((channel, value));
        true
    }
}
