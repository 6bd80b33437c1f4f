//! Selkie core
//!
//! Shared infrastructure for the selkie routing engine:
//! - Explicit, bounded tunables ([`constants`])
//! - Time abstraction for deterministic tests ([`io`])
//! - Telemetry bootstrap ([`telemetry`])
//!
//! Library crates emit `tracing` events but never install a global
//! subscriber; binaries call [`telemetry::init_telemetry`] once at process
//! boundaries.

pub mod constants;
pub mod io;
pub mod telemetry;

pub use io::{MockClock, TimeProvider, WallClockTime};
