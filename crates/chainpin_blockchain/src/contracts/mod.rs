//! # Contract Definitions
//!
//! The PinController contract interface, as deployed for the device
//! controller dApp.

// The sol! macro generates code that we can't document, so allow missing_docs
#![allow(missing_docs)]

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};

sol! {
    /// Per-device pin switchboard. Device owners flip pins on-chain and the
    /// bridge mirrors them onto GPIO.
    #[derive(Debug, PartialEq, Eq)]
    interface IPinController {
        /// Emitted when a device owner changes a pin. `status` is the
        /// `PinStatus` enum (0 = off, 1 = on) encoded as `uint8`.
        event DevicePinStatusChanged(
            uint256 indexed deviceId,
            uint8 indexed pin,
            uint8 status
        );

        /// Current status of one pin of one device.
        function getDevicePinStatus(uint256 _deviceId, uint8 _pin) external view returns (uint8);
    }
}

pub use IPinController::{DevicePinStatusChanged, getDevicePinStatusCall};

/// Topic 0 of every `DevicePinStatusChanged` log.
pub const PIN_STATUS_CHANGED_TOPIC: alloy_primitives::B256 = DevicePinStatusChanged::SIGNATURE_HASH;

/// Address and device pair the bridge talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinController {
    /// Deployed contract address.
    pub address: Address,
    /// The device whose pins we mirror.
    pub device_id: U256,
}

impl PinController {
    /// Creates a handle for `device_id` on the contract at `address`.
    #[must_use]
    pub const fn new(address: Address, device_id: U256) -> Self {
        Self { address, device_id }
    }

    /// ABI-encodes a `getDevicePinStatus` call for this device.
    #[must_use]
    pub fn encode_pin_status_call(&self, pin: u8) -> Vec<u8> {
        getDevicePinStatusCall {
            _deviceId: self.device_id,
            _pin: pin,
        }
        .abi_encode()
    }

    /// Decodes the return data of a `getDevicePinStatus` call.
    pub fn decode_pin_status_return(data: &[u8]) -> Result<u8, alloy_sol_types::Error> {
        getDevicePinStatusCall::abi_decode_returns(data, true).map(|ret| ret._0)
    }
}
