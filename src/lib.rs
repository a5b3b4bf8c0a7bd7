//! # Proxy Viscometer Core Library
//!
//! This crate sequences a liquid-handling robot through the proxy viscometer
//! measurement protocol: fixed-volume aspirations and dispenses at set flow
//! rates, timed settling delays, and pauses for manual mass readings. The
//! library holds all protocol logic so the CLI (`main.rs`) stays thin and the
//! schedule can be driven against any robot backend.
//!
//! ## Crate Structure
//!
//! - **`config`**: figment-based `RunnerConfig` (TOML file plus `VISCO_`
//!   environment overrides) with validation.
//! - **`error`**: the `ViscometerError` enum for domain failures.
//! - **`hardware`**: async capability traits for the robot (`ProtocolControl`,
//!   `Pipette`), the operator prompt, and a strict simulated backend.
//! - **`labware`**: labware definition schema, built-in plates and tip racks,
//!   well names and deck locations.
//! - **`protocol`**: calibration models, the sample plan, the runner and its
//!   `RunReport`.
//! - **`tracing_setup`**: tracing-subscriber initialisation.

pub mod config;
pub mod error;
pub mod hardware;
pub mod labware;
pub mod protocol;
pub mod tracing_setup;

pub use config::RunnerConfig;
pub use error::{AppResult, ViscometerError};
pub use protocol::{ProtocolRunner, RunReport};
