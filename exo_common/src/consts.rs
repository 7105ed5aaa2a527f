//! System-wide constants for the EXO workspace.
//!
//! Single source of truth for timing defaults, channel limits and the
//! network surface parameters. Imported by all crates.

/// Default control loop period [s] when the robot config gives no `time_step`.
pub const DEFAULT_CONTROL_PERIOD_S: f64 = 0.005;

/// Bounded wait when joining the control thread on disable [ms].
/// A join that exceeds this is a hardware-fault condition.
pub const CONTROL_JOIN_TIMEOUT_MS: u64 = 5000;

/// Consecutive error ticks tolerated before the robot raises a fault
/// condition toward clients.
pub const DEVICE_ERROR_STREAK_LIMIT: u32 = 50;

/// Max concurrent readers of a single signal acquisition channel.
pub const MAX_INPUT_CHANNEL_READERS: usize = 5;

/// Dispatcher wake period [ms].
pub const DISPATCH_PERIOD_MS: u64 = 5;

/// Minimum interval between telemetry broadcasts [ms].
pub const TELEMETRY_MIN_INTERVAL_MS: u64 = 20;

/// Upper bound for any IPC message, requests and telemetry alike [bytes].
pub const MAX_MESSAGE_LENGTH: usize = 512;

/// Default TCP port for the request/reply event channel.
pub const EVENTS_PORT: u16 = 50000;

/// Default UDP port for axis setpoint/measure streaming.
pub const AXES_PORT: u16 = 50001;

/// Default UDP port for joint measure streaming.
pub const JOINTS_PORT: u16 = 50002;

/// Default decimal places written by sample logs.
pub const DEFAULT_LOG_PRECISION: usize = 3;
