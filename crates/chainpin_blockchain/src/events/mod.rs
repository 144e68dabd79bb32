//! # Pin Events
//!
//! Raw log and decoded event types for `DevicePinStatusChanged`.
//!
//! Decoding is done by hand straight from topic and data words so that every
//! malformed field gets its own error instead of a generic ABI failure.

use alloy_primitives::{B256, U256};
use thiserror::Error;

use super::contracts::PIN_STATUS_CHANGED_TOPIC;

/// On/off state carried by a pin event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PinStatus {
    /// Pin released (logical LOW).
    Off,
    /// Pin driven (logical HIGH).
    On,
}

impl PinStatus {
    /// Maps the on-chain `uint8` to a status. Zero is off, anything else is on.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Self::Off
        } else {
            Self::On
        }
    }

    /// Returns `true` for [`PinStatus::On`].
    #[inline]
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    /// Console label: `ON` or `OFF`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }
}

impl std::fmt::Display for PinStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An undecoded contract log as returned by the node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawLog {
    /// Indexed topics, topic 0 being the event signature.
    pub topics: Vec<B256>,
    /// Non-indexed ABI data.
    pub data: Vec<u8>,
    /// Block the log was mined in, if the node reported it.
    pub block_number: Option<u64>,
    /// Position in the block, if the node reported it.
    pub log_index: Option<u64>,
}

impl RawLog {
    /// Builds a well-formed `DevicePinStatusChanged` log.
    ///
    /// Used by the simulator and tests.
    #[must_use]
    pub fn pin_status_changed(device_id: U256, pin: u8, status: u8) -> Self {
        let mut data = vec![0u8; 32];
        data[31] = status;
        Self {
            topics: vec![
                PIN_STATUS_CHANGED_TOPIC,
                B256::from(device_id.to_be_bytes::<32>()),
                B256::from(U256::from(pin).to_be_bytes::<32>()),
            ],
            data,
            block_number: None,
            log_index: None,
        }
    }

    /// Sets the log position.
    #[must_use]
    pub fn at(mut self, block_number: u64, log_index: u64) -> Self {
        self.block_number = Some(block_number);
        self.log_index = Some(log_index);
        self
    }

    /// The indexed device id (topic 1), if present.
    #[must_use]
    pub fn device_topic(&self) -> Option<&B256> {
        self.topics.get(1)
    }
}

/// A decoded `DevicePinStatusChanged` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinStatusChange {
    /// Device the change belongs to.
    pub device_id: U256,
    /// BCM pin number.
    pub pin: u8,
    /// New pin status.
    pub status: PinStatus,
    /// Block where this occurred.
    pub block_number: Option<u64>,
    /// Log index within the block.
    pub log_index: Option<u64>,
}

impl std::fmt::Display for PinStatusChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{deviceId: {}, pin: {}, status: {}}}",
            self.device_id,
            self.pin,
            u8::from(self.status.is_on())
        )
    }
}

/// Reasons a log could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Log has fewer topics than the event declares.
    #[error("expected 3 topics, got {0}")]
    MissingTopics(usize),

    /// Topic 0 is not the `DevicePinStatusChanged` signature.
    #[error("unexpected event signature {0}")]
    WrongSignature(B256),

    /// `pin` topic does not fit in a `uint8`.
    #[error("pin topic out of range: {0}")]
    PinOutOfRange(U256),

    /// Data section shorter than one word.
    #[error("status data too short: {0} bytes")]
    MissingStatus(usize),

    /// `status` word does not fit in a `uint8`.
    #[error("status out of range: {0}")]
    StatusOutOfRange(U256),
}

/// Event parser for raw log data.
pub struct EventParser;

impl EventParser {
    /// Parses a `DevicePinStatusChanged` event.
    ///
    /// Layout:
    /// - topics: `signature | deviceId | pin`
    /// - data: `status` (one 32-byte word)
    pub fn parse_pin_status_changed(log: &RawLog) -> Result<PinStatusChange, EventError> {
        let [signature, device, pin, ..] = log.topics.as_slice() else {
            return Err(EventError::MissingTopics(log.topics.len()));
        };

        if *signature != PIN_STATUS_CHANGED_TOPIC {
            return Err(EventError::WrongSignature(*signature));
        }

        let device_id = U256::from_be_bytes(device.0);

        let pin_word = U256::from_be_bytes(pin.0);
        let pin = u8::try_from(pin_word).map_err(|_| EventError::PinOutOfRange(pin_word))?;

        let Some(status_bytes) = log.data.get(..32) else {
            return Err(EventError::MissingStatus(log.data.len()));
        };
        let status_word = U256::from_be_slice(status_bytes);
        let status =
            u8::try_from(status_word).map_err(|_| EventError::StatusOutOfRange(status_word))?;

        Ok(PinStatusChange {
            device_id,
            pin,
            status: PinStatus::from_raw(status),
            block_number: log.block_number,
            log_index: log.log_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::DevicePinStatusChanged;
    use alloy_sol_types::SolEvent;

    #[test]
    fn test_parse_well_formed_log() {
        let log = RawLog::pin_status_changed(U256::from(7), 14, 1).at(100, 3);
        let event = EventParser::parse_pin_status_changed(&log).unwrap();

        assert_eq!(event.device_id, U256::from(7));
        assert_eq!(event.pin, 14);
        assert_eq!(event.status, PinStatus::On);
        assert_eq!(event.block_number, Some(100));
        assert_eq!(event.log_index, Some(3));
    }

    #[test]
    fn test_parse_matches_abi_encoding() {
        let encoded = DevicePinStatusChanged {
            deviceId: U256::from(42),
            pin: 25,
            status: 0,
        }
        .encode_log_data();

        let log = RawLog {
            topics: encoded.topics().to_vec(),
            data: encoded.data.to_vec(),
            ..RawLog::default()
        };
        let event = EventParser::parse_pin_status_changed(&log).unwrap();

        assert_eq!(event.device_id, U256::from(42));
        assert_eq!(event.pin, 25);
        assert_eq!(event.status, PinStatus::Off);
    }

    #[test]
    fn test_any_nonzero_status_is_on() {
        let log = RawLog::pin_status_changed(U256::from(1), 15, 2);
        let event = EventParser::parse_pin_status_changed(&log).unwrap();
        assert_eq!(event.status, PinStatus::On);
    }

    #[test]
    fn test_missing_topics() {
        let mut log = RawLog::pin_status_changed(U256::from(1), 15, 1);
        log.topics.truncate(2);
        assert_eq!(
            EventParser::parse_pin_status_changed(&log),
            Err(EventError::MissingTopics(2))
        );
    }

    #[test]
    fn test_wrong_signature() {
        let mut log = RawLog::pin_status_changed(U256::from(1), 15, 1);
        log.topics[0] = B256::ZERO;
        assert_eq!(
            EventParser::parse_pin_status_changed(&log),
            Err(EventError::WrongSignature(B256::ZERO))
        );
    }

    #[test]
    fn test_pin_out_of_range() {
        let mut log = RawLog::pin_status_changed(U256::from(1), 15, 1);
        log.topics[2] = B256::from(U256::from(300).to_be_bytes::<32>());
        assert_eq!(
            EventParser::parse_pin_status_changed(&log),
            Err(EventError::PinOutOfRange(U256::from(300)))
        );
    }

    #[test]
    fn test_missing_and_oversized_status() {
        let mut log = RawLog::pin_status_changed(U256::from(1), 15, 1);
        log.data.clear();
        assert_eq!(
            EventParser::parse_pin_status_changed(&log),
            Err(EventError::MissingStatus(0))
        );

        let mut log = RawLog::pin_status_changed(U256::from(1), 15, 1);
        log.data[30] = 1;
        assert_eq!(
            EventParser::parse_pin_status_changed(&log),
            Err(EventError::StatusOutOfRange(U256::from(257)))
        );
    }

    #[test]
    fn test_display_matches_console_format() {
        let log = RawLog::pin_status_changed(U256::from(7), 14, 1);
        let event = EventParser::parse_pin_status_changed(&log).unwrap();
        assert_eq!(event.to_string(), "{deviceId: 7, pin: 14, status: 1}");
    }
}
