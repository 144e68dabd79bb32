//! # Bridge Error Types
//!
//! Startup errors are fatal; per-event errors are reported and skipped.

use std::path::PathBuf;

use chainpin_blockchain::{EventError, ListenerError};
use chainpin_gpio::GpioError;
use thiserror::Error;

/// Configuration could not be resolved.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Contract address is not a 20-byte hex string.
    #[error("invalid contract address {value:?}: {reason}")]
    InvalidContractAddress {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Device id is not a non-negative decimal integer that fits `uint256`.
    #[error("invalid device id {0:?}: expected a non-negative integer")]
    InvalidDeviceId(String),

    /// No device id was supplied and none could be read from stdin.
    #[error("no device id given")]
    MissingDeviceId,

    /// A pin number in the mapping is not a `u8`.
    #[error("invalid pin number {0:?}")]
    InvalidPin(String),

    /// The pin mapping has no entries.
    #[error("pin mapping is empty")]
    EmptyPinMapping,

    /// A setting has an unusable value.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Unrecognized command-line flag.
    #[error("unknown flag {0} (see --help)")]
    UnknownFlag(String),

    /// Flag given without its value.
    #[error("flag {0} needs a value")]
    MissingFlagValue(String),

    /// Config file could not be read.
    #[error("cannot read {path}: {source}")]
    ReadFile {
        /// File path.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("cannot parse {path}: {source}")]
    ParseFile {
        /// File path.
        path: PathBuf,
        /// TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// Reading the interactive prompt failed.
    #[error("cannot read device id from stdin: {0}")]
    Prompt(#[source] std::io::Error),

    /// Backend selected that this build does not include.
    #[error("gpio backend {0:?} is not compiled in (rebuild with --features {0})")]
    BackendNotCompiled(&'static str),
}

/// Failure while applying a single log.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Log could not be decoded.
    #[error(transparent)]
    Decode(#[from] EventError),

    /// GPIO write failed.
    #[error(transparent)]
    Gpio(#[from] GpioError),
}

/// Errors that stop the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Subscription could not be created, or polling failed under the
    /// `exit` policy.
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// GPIO backend could not be opened or set up.
    #[error(transparent)]
    Gpio(#[from] GpioError),
}

/// Result type for bridge startup and loop.
pub type BridgeResult<T> = Result<T, BridgeError>;
