//! # Raspberry Pi GPIO
//!
//! rppal-backed output pins. Pins are not reset when the process exits, so
//! the last on-chain state stays on the header.

use std::collections::HashMap;

use rppal::gpio::{Gpio, OutputPin};

use crate::{GpioError, Level, OutputPins};

/// Output pins on the Pi's header.
pub struct RppalPins {
    gpio: Gpio,
    pins: HashMap<u8, OutputPin>,
}

impl RppalPins {
    /// Opens `/dev/gpiomem`.
    pub fn open() -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(|e| GpioError::Unavailable(e.to_string()))?;
        Ok(Self {
            gpio,
            pins: HashMap::new(),
        })
    }
}

impl From<Level> for rppal::gpio::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => Self::Low,
            Level::High => Self::High,
        }
    }
}

impl OutputPins for RppalPins {
    fn configure_output(&mut self, pin: u8) -> Result<(), GpioError> {
        if self.pins.contains_key(&pin) {
            return Ok(());
        }

        let mut output = self
            .gpio
            .get(pin)
            .map_err(|e| GpioError::Driver {
                pin,
                message: e.to_string(),
            })?
            .into_output();
        output.set_reset_on_drop(false);

        tracing::debug!(pin, "configured as output");
        self.pins.insert(pin, output);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        let output = self.pins.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        output.write(level.into());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "rpi"
    }
}
