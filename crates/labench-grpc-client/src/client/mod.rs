//! The `labench` command-line client.
//!
//! ## Structure
//!
//! - [`config`] - CLI arguments and the YAML run file.
//! - [`driver`] - Spawns workers and aggregates the run summary.
//! - [`telemetry`] - Logging, tracing and metrics setup.

pub mod config;
pub mod driver;
pub mod telemetry;
