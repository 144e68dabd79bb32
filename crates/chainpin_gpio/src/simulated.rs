//! # Simulated GPIO
//!
//! In-process stand-in for a pin header. Every write is logged; levels are
//! kept so the simulator can report them back.

use std::collections::BTreeMap;

use crate::{GpioError, Level, OutputPins};

/// Simulated output pins.
#[derive(Debug, Default)]
pub struct SimulatedPins {
    /// Current level of each configured pin (`None` until first write).
    levels: BTreeMap<u8, Option<Level>>,
    /// Every successful write, when recording is on.
    history: Option<Vec<(u8, Level)>>,
}

impl SimulatedPins {
    /// Creates a simulator with no pins configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a simulator that also keeps the full write history.
    #[must_use]
    pub fn recording() -> Self {
        Self {
            levels: BTreeMap::new(),
            history: Some(Vec::new()),
        }
    }

    /// Level last written to `pin`, if any.
    #[must_use]
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.levels.get(&pin).copied().flatten()
    }

    /// Whether `pin` has been configured as an output.
    #[must_use]
    pub fn is_output(&self, pin: u8) -> bool {
        self.levels.contains_key(&pin)
    }

    /// Configured pins in ascending order.
    pub fn outputs(&self) -> impl Iterator<Item = u8> + '_ {
        self.levels.keys().copied()
    }

    /// Recorded writes, oldest first. Empty unless built with [`Self::recording`].
    #[must_use]
    pub fn history(&self) -> &[(u8, Level)] {
        self.history.as_deref().unwrap_or(&[])
    }
}

impl OutputPins for SimulatedPins {
    fn configure_output(&mut self, pin: u8) -> Result<(), GpioError> {
        if self.levels.contains_key(&pin) {
            tracing::debug!(pin, "sim: pin reconfigured as output");
        } else {
            tracing::debug!(pin, "sim: pin configured as output");
        }
        self.levels.entry(pin).or_insert(None);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), GpioError> {
        let slot = self.levels.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        *slot = Some(level);
        if let Some(history) = &mut self.history {
            history.push((pin, level));
        }
        tracing::info!(pin, %level, "sim: output set");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_requires_configuration() {
        let mut pins = SimulatedPins::new();
        assert!(matches!(pins.write(14, Level::High), Err(GpioError::NotConfigured(14))));
        assert_eq!(pins.level(14), None);
    }

    #[test]
    fn test_levels_follow_writes() {
        let mut pins = SimulatedPins::new();
        pins.configure_output(14).unwrap();
        assert!(pins.is_output(14));
        assert_eq!(pins.level(14), None);

        pins.write(14, Level::High).unwrap();
        assert_eq!(pins.level(14), Some(Level::High));

        pins.write(14, Level::Low).unwrap();
        assert_eq!(pins.level(14), Some(Level::Low));
    }

    #[test]
    fn test_reconfigure_is_silent() {
        let mut pins = SimulatedPins::new();
        pins.configure_output(18).unwrap();
        pins.configure_output(18).unwrap();
        assert_eq!(pins.outputs().collect::<Vec<_>>(), vec![18]);
    }

    #[test]
    fn test_reconfigure_keeps_level() {
        let mut pins = SimulatedPins::new();
        pins.configure_output(18).unwrap();
        pins.write(18, Level::High).unwrap();

        pins.configure_output(18).unwrap();
        assert_eq!(pins.level(18), Some(Level::High));
    }

    #[test]
    fn test_history_only_when_recording() {
        let mut plain = SimulatedPins::new();
        plain.configure_output(23).unwrap();
        plain.write(23, Level::High).unwrap();
        assert!(plain.history().is_empty());

        let mut recorded = SimulatedPins::recording();
        recorded.configure_output(23).unwrap();
        recorded.write(23, Level::High).unwrap();
        recorded.write(23, Level::High).unwrap();
        assert_eq!(recorded.history(), &[(23, Level::High), (23, Level::High)]);
    }
}
