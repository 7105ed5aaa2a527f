//! Shared definitions for the EXO robot control workspace.
//!
//! Everything the acquisition, control and network crates agree on lives
//! here: the per-DoF variable record, the lifecycle state machines, the
//! configuration schemas and their loader, the runtime [`Environment`],
//! and the append-only sample logger.
//!
//! This crate performs no device or network I/O of its own.

pub mod config;
pub mod consts;
pub mod env;
pub mod log;
pub mod state;
pub mod types;

pub use env::Environment;
pub use types::{ControlVariable, DofVariables, CONTROL_VARS_NUMBER};
