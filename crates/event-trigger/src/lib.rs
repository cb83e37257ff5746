//! Synthetic module event generator for the EventMonitor.
//!
//! This crate emulates a small fleet of independent modules. Each module
//! opens one TCP connection to the monitor and streams newline-delimited JSON
//! status and telemetry messages, exercising the receiver with realistic
//! sequences of INFO, WARNING, ERROR, CRITICAL and raw DATA messages.
//!
//! # Per-client behaviour
//! - Announces itself with `INFO "Module started"`
//! - Samples a sensor value from a weighted band table every 50-150ms
//! - Sends every sample as `DATA`, and a log message on every band transition
//! - Summarises every 5 transitions back to NORMAL with a stability message
//! - Stops when its value goes CRITICAL
//!
//! When the designated client (the last one by default) goes CRITICAL, every
//! client is blocked, and after a grace period the whole fleet stops.
//!
//! # Usage
//! ```bash
//! # Three modules against a local monitor
//! event-trigger --host 127.0.0.1 --port 5050
//!
//! # Reproducible run with a custom fleet
//! event-trigger --clients 1,2,3,4 --seed 42
//!
//! # Print messages instead of connecting
//! event-trigger --dry-run
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod fleet;
pub mod message;
pub mod report;
pub mod stats;
pub mod transport;

/// Identifier of a simulated module.
pub type ClientId = u32;

pub use classifier::{Band, BandRange, Classifier, Sample, Subrange};
pub use client::{ClientPhase, ClientState};
pub use config::{SimulatorConfig, TimingConfig};
pub use driver::run_simulation;
pub use error::{Result, SimulatorError};
pub use fleet::FleetControl;
pub use message::{Message, MessageType};
pub use report::{ClientOutcome, SimulationReport};
pub use transport::{Connection, MemoryTransport, TcpTransport, Transport};
