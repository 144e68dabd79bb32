//! # CHAINPIN
//!
//! Mirrors `DevicePinStatusChanged` events of one device onto GPIO outputs.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  RawLog  ┌──────────────┐  Level  ┌──────────────┐
//! │ EventSource  │ ───────▶ │  Reconciler  │ ──────▶ │  OutputPins  │
//! │ (node / sim) │          │ (PinMapping) │         │ (rpi / sim)  │
//! └──────────────┘          └──────────────┘         └──────────────┘
//! ```
//!
//! - [`config`] resolves settings from defaults, file, environment and flags
//! - [`reconcile`] turns one log into at most one pin write
//! - [`bridge`] drives the poll loop and reports on the console
//! - [`logging`] loads `.env` and installs the log subscriber

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod reconcile;

pub use bridge::{Backoff, Bridge, BridgeSettings, BridgeTotals};
pub use config::{BackendKind, BridgeConfig, CliArgs, FileConfig, PinMapping, PollErrorPolicy};
pub use error::{BridgeError, BridgeResult, ConfigError, ReconcileError};
pub use reconcile::{Outcome, ReconcileStats, Reconciler};
