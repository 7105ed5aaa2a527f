//! Built-in Signal-I/O drivers.
//!
//! - [`dummy`] — inert backend: single zero sample, accepts everything.
//! - [`simulation`] — waveform generator for bench runs without hardware.
//! - [`mock`] — scripted backend with observable counters for tests.

pub mod dummy;
pub mod mock;
pub mod simulation;
