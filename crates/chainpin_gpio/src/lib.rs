//! # CHAINPIN GPIO
//!
//! The output-pin capability the bridge drives, and its backends.
//!
//! ```text
//! ┌──────────────┐   configure_output / write   ┌──────────────────┐
//! │  Reconciler  │ ───────────────────────────▶ │  impl OutputPins │
//! └──────────────┘                              └────────┬─────────┘
//!                                          ┌─────────────┴─────────────┐
//!                                          ▼                           ▼
//!                                  ┌───────────────┐           ┌───────────────┐
//!                                  │ SimulatedPins │           │  RppalPins    │
//!                                  │ (any host)    │           │  (feature rpi)│
//!                                  └───────────────┘           └───────────────┘
//! ```
//!
//! Pins use BCM numbering. A backend must refuse writes to pins that were
//! never configured as outputs.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod simulated;

#[cfg(feature = "rpi")]
pub mod rpi;

pub use simulated::SimulatedPins;

#[cfg(feature = "rpi")]
pub use rpi::RppalPins;

use thiserror::Error;

/// Logical output level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    /// Logical low.
    Low,
    /// Logical high.
    High,
}

impl Level {
    /// HIGH for `true`, LOW for `false`.
    #[inline]
    #[must_use]
    pub const fn from_bool(on: bool) -> Self {
        if on {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("LOW"),
            Self::High => f.write_str("HIGH"),
        }
    }
}

/// GPIO errors.
#[derive(Error, Debug)]
pub enum GpioError {
    /// Write to a pin that was never configured as an output.
    #[error("pin {0} is not configured as an output")]
    NotConfigured(u8),

    /// The backend cannot be opened on this host.
    #[error("gpio backend unavailable: {0}")]
    Unavailable(String),

    /// Driver-level failure.
    #[error("gpio driver error on pin {pin}: {message}")]
    Driver {
        /// The pin involved.
        pin: u8,
        /// Driver message.
        message: String,
    },
}

/// Digital output capability.
///
/// Single writer: the bridge owns its backend exclusively.
pub trait OutputPins {
    /// Configures `pin` as a digital output.
    ///
    /// Reconfiguring a pin that is already an output is not an error and
    /// does not warn.
    fn configure_output(&mut self, pin: u8) -> Result<(), GpioError>;

    /// Drives `pin` to `level`.
    fn write(&mut self, pin: u8, level: Level) -> Result<(), GpioError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

impl<T: OutputPins + ?Sized> OutputPins for Box<T> {
    fn configure_output(&mut self, pin: u8) -> Result<(), GpioError> {
        (**self).configure_output(pin)
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        (**self).write(pin, level)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
