//! # CHAINPIN Blockchain Bridge
//!
//! Contract side of the bridge: the `PinController` interface, decoding of
//! `DevicePinStatusChanged` logs, and the log cursor that polls a node for
//! new events of one device.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    Logs     ┌─────────────────┐
//! │  PinController  │ ──────────▶ │  PinEventFilter │
//! │  Contract       │             │  (block cursor) │
//! └─────────────────┘             └────────┬────────┘
//!                                          │ RawLog
//!                                          ▼
//!                                 ┌─────────────────┐
//!                                 │  EventParser    │
//!                                 │  (per log)      │
//!                                 └─────────────────┘
//! ```
//!
//! Decoding is left to the consumer so that one malformed log can be
//! reported and skipped without losing the rest of the batch.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod contracts;
pub mod events;
pub mod listener;

pub use contracts::{PinController, PIN_STATUS_CHANGED_TOPIC};
pub use events::{EventError, EventParser, PinStatus, PinStatusChange, RawLog};
pub use listener::{
    BlockCursor, EventSimulator, EventSource, ListenerConfig, ListenerError, ListenerStats,
    ListenerTotals, LogRpc, PinEventFilter, PinStatusReader,
};
