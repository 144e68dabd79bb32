//! # Reconciliation
//!
//! Applies one pin event at a time to the GPIO backend.
//!
//! Only pins present in the [`PinMapping`] are ever touched: unmapped pins
//! are reported and skipped, and the backend itself refuses pins that were
//! not configured during [`Reconciler::setup`].

use chainpin_blockchain::{EventParser, PinStatus, PinStatusChange, RawLog};
use chainpin_gpio::{GpioError, Level, OutputPins};

use crate::config::PinMapping;
use crate::error::ReconcileError;

/// What happened to one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The pin was driven to match `status`.
    Applied {
        /// BCM pin.
        pin: u8,
        /// Mapped label.
        label: String,
        /// Status applied.
        status: PinStatus,
    },
    /// The pin is not in the mapping; nothing was written.
    Unmapped {
        /// BCM pin.
        pin: u8,
    },
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied { label, status, .. } => write!(f, "{label} {status}"),
            Self::Unmapped { pin } => write!(f, "Pin {pin} is not mapped to a room. Skipping..."),
        }
    }
}

/// Running totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Events that wrote a pin.
    pub applied: u64,
    /// Events for unmapped pins.
    pub unmapped: u64,
    /// Events that failed to decode or write.
    pub errors: u64,
}

/// Maps pin events onto GPIO outputs.
pub struct Reconciler<G> {
    pins: PinMapping,
    gpio: G,
    stats: ReconcileStats,
}

impl<G: OutputPins> Reconciler<G> {
    /// Creates a reconciler. Call [`Self::setup`] before applying events.
    #[must_use]
    pub fn new(pins: PinMapping, gpio: G) -> Self {
        Self {
            pins,
            gpio,
            stats: ReconcileStats::default(),
        }
    }

    /// Configures every mapped pin as an output.
    pub fn setup(&mut self) -> Result<(), GpioError> {
        for pin in self.pins.pins() {
            self.gpio.configure_output(pin)?;
        }
        tracing::info!(
            backend = self.gpio.name(),
            pins = self.pins.len(),
            "gpio outputs configured"
        );
        Ok(())
    }

    /// Drives `pin` to match `status` if it is mapped.
    pub fn apply_status(&mut self, pin: u8, status: PinStatus) -> Result<Outcome, GpioError> {
        let Some(label) = self.pins.label(pin) else {
            return Ok(Outcome::Unmapped { pin });
        };

        self.gpio.write(pin, Level::from_bool(status.is_on()))?;
        Ok(Outcome::Applied {
            pin,
            label: label.to_string(),
            status,
        })
    }

    /// Applies an already decoded event.
    pub fn apply_event(&mut self, event: &PinStatusChange) -> Result<Outcome, GpioError> {
        tracing::debug!(%event, block = ?event.block_number, "PinStatusChanged event");
        self.apply_status(event.pin, event.status)
    }

    /// Decodes `log` and applies it.
    pub fn apply(&mut self, log: &RawLog) -> Result<Outcome, ReconcileError> {
        let event = EventParser::parse_pin_status_changed(log)?;
        Ok(self.apply_event(&event)?)
    }

    /// [`Self::apply`] plus bookkeeping. Errors are returned for the caller
    /// to report; they never leave the reconciler in a different state.
    pub fn handle(&mut self, log: &RawLog) -> Result<Outcome, ReconcileError> {
        let result = self.apply(log);
        self.record(&result);
        result
    }

    /// Counts an outcome produced outside [`Self::handle`].
    pub fn record<E>(&mut self, result: &Result<Outcome, E>) {
        match result {
            Ok(Outcome::Applied { .. }) => self.stats.applied += 1,
            Ok(Outcome::Unmapped { .. }) => self.stats.unmapped += 1,
            Err(_) => self.stats.errors += 1,
        }
    }

    /// Totals so far.
    #[must_use]
    pub const fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// The pin mapping.
    #[must_use]
    pub const fn pins(&self) -> &PinMapping {
        &self.pins
    }

    /// The GPIO backend.
    #[must_use]
    pub const fn gpio(&self) -> &G {
        &self.gpio
    }
}
