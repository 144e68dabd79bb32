//! # Bridge Configuration
//!
//! Resolved once at startup, in layers (later wins):
//!
//! 1. built-in defaults
//! 2. TOML file (`--config <path>`)
//! 3. environment (`RPC_URL`, `CONTRACT_ADDRESS`, `DEVICE_ID`)
//! 4. command-line flags
//!
//! If no layer supplies a device id, the binary prompts for one on stdin.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use chainpin_blockchain::ListenerConfig;
use chainpin_gpio::{OutputPins, SimulatedPins};
use serde::Deserialize;

use crate::error::ConfigError;

/// Fallback RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://sepolia.infura.io/v3/93a0b3c64c20485aa3a1e9886e4faba9";

/// Fallback PinController deployment.
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("5Bd4d84A0Abee57fCE4cD9064A21068813305f74");

/// Default pause between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// Default `eth_getLogs` span.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 500;

/// Environment variable names.
pub mod env {
    /// RPC endpoint.
    pub const RPC_URL: &str = "RPC_URL";
    /// Contract address.
    pub const CONTRACT_ADDRESS: &str = "CONTRACT_ADDRESS";
    /// Device id.
    pub const DEVICE_ID: &str = "DEVICE_ID";
}

/// Prompt shown when the device id has to be typed in.
pub const DEVICE_ID_PROMPT: &str = "Enter the device id: ";

/// Pin number to label. Fixed for the process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinMapping {
    labels: BTreeMap<u8, String>,
}

impl PinMapping {
    /// Builds a mapping. Fails if empty.
    pub fn new<L: Into<String>>(
        entries: impl IntoIterator<Item = (u8, L)>,
    ) -> Result<Self, ConfigError> {
        let labels: BTreeMap<u8, String> = entries
            .into_iter()
            .map(|(pin, label)| (pin, label.into()))
            .collect();
        if labels.is_empty() {
            return Err(ConfigError::EmptyPinMapping);
        }
        Ok(Self { labels })
    }

    /// The three-room reference deployment.
    #[must_use]
    pub fn reference() -> Self {
        let labels = [
            (14, "Room 1 Fan"),
            (15, "Room 1 Light"),
            (18, "Room 2 Fan"),
            (23, "Room 2 Light"),
            (24, "Room 3 Fan"),
            (25, "Room 3 Light"),
        ]
        .into_iter()
        .map(|(pin, label)| (pin, label.to_string()))
        .collect();
        Self { labels }
    }

    /// Label for `pin`, or `None` if the pin is unmapped.
    #[must_use]
    pub fn label(&self, pin: u8) -> Option<&str> {
        self.labels.get(&pin).map(String::as_str)
    }

    /// Whether `pin` is mapped.
    #[must_use]
    pub fn contains(&self, pin: u8) -> bool {
        self.labels.contains_key(&pin)
    }

    /// Mapped pins in ascending order.
    pub fn pins(&self) -> impl Iterator<Item = u8> + '_ {
        self.labels.keys().copied()
    }

    /// `(pin, label)` pairs in ascending pin order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.labels.iter().map(|(pin, label)| (*pin, label.as_str()))
    }

    /// Number of mapped pins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always `false`; an empty mapping cannot be built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for PinMapping {
    fn default() -> Self {
        Self::reference()
    }
}

/// Which GPIO implementation drives the pins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process simulator.
    #[default]
    Simulated,
    /// Raspberry Pi header via rppal.
    Rpi,
}

impl BackendKind {
    /// Opens the backend.
    ///
    /// Fails with [`ConfigError::BackendNotCompiled`] when `rpi` is selected
    /// in a build without the `rpi` feature.
    pub fn open(self) -> Result<Box<dyn OutputPins>, crate::error::BridgeError> {
        match self {
            Self::Simulated => Ok(Box::new(SimulatedPins::new())),
            #[cfg(feature = "rpi")]
            Self::Rpi => Ok(Box::new(chainpin_gpio::RppalPins::open()?)),
            #[cfg(not(feature = "rpi"))]
            Self::Rpi => Err(ConfigError::BackendNotCompiled("rpi").into()),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulated" | "sim" => Ok(Self::Simulated),
            "rpi" => Ok(Self::Rpi),
            other => Err(ConfigError::InvalidValue {
                key: "backend",
                value: other.to_string(),
            }),
        }
    }
}

/// What the loop does when a poll fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollErrorPolicy {
    /// Report, back off, and poll again.
    #[default]
    Retry,
    /// Stop the loop and exit non-zero.
    Exit,
}

impl FromStr for PollErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retry" => Ok(Self::Retry),
            "exit" => Ok(Self::Exit),
            other => Err(ConfigError::InvalidValue {
                key: "on_poll_error",
                value: other.to_string(),
            }),
        }
    }
}

/// Device id as written in a TOML file: a small integer or a decimal string.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeviceIdValue {
    /// `device_id = 7`
    Number(u64),
    /// `device_id = "340282366920938463463374607431768211456"`
    Text(String),
}

/// On-disk configuration. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// RPC endpoint.
    pub rpc_url: Option<String>,
    /// Contract address.
    pub contract_address: Option<String>,
    /// Device id.
    pub device_id: Option<DeviceIdValue>,
    /// Pause between polls in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// `eth_getLogs` span.
    pub max_block_range: Option<u64>,
    /// GPIO backend.
    pub backend: Option<BackendKind>,
    /// Poll failure policy.
    pub on_poll_error: Option<PollErrorPolicy>,
    /// Read current pin status from the contract before listening.
    pub sync_on_start: Option<bool>,
    /// Pin mapping, replacing the default one. Keys are pin numbers.
    pub pins: Option<BTreeMap<String, String>>,
}

impl FileConfig {
    /// Parses TOML text.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }
}

/// Parsed command-line flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// `--config <path>`
    pub config_path: Option<PathBuf>,
    /// `--rpc-url <url>`
    pub rpc_url: Option<String>,
    /// `--contract <address>`
    pub contract_address: Option<String>,
    /// `--device <id>`
    pub device_id: Option<String>,
    /// `--poll-interval-ms <ms>`
    pub poll_interval_ms: Option<u64>,
    /// `--max-block-range <blocks>`
    pub max_block_range: Option<u64>,
    /// `--backend simulated|rpi`
    pub backend: Option<BackendKind>,
    /// `--on-poll-error retry|exit`
    pub on_poll_error: Option<PollErrorPolicy>,
    /// `--sync-on-start`
    pub sync_on_start: bool,
    /// `--help`
    pub help: bool,
}

impl CliArgs {
    /// Usage text for `--help`.
    pub const USAGE: &'static str = "\
Usage: chainpin [OPTIONS]

Options:
  --config <path>            TOML config file
  --rpc-url <url>            RPC endpoint (env RPC_URL)
  --contract <address>       PinController address (env CONTRACT_ADDRESS)
  --device <id>              Device id to follow (env DEVICE_ID; prompted if absent)
  --poll-interval-ms <ms>    Pause between polls [default: 1000]
  --max-block-range <n>      Blocks per eth_getLogs call [default: 500]
  --backend <simulated|rpi>  GPIO backend [default: simulated]
  --on-poll-error <retry|exit>
                             What to do when polling fails [default: retry]
  --sync-on-start            Read current pin status from the contract first
  --help                     Show this text";

    /// Parses flags (without the program name).
    pub fn parse<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| ConfigError::MissingFlagValue(flag.to_string()))
            };

            match flag.as_str() {
                "--config" => parsed.config_path = Some(PathBuf::from(value(&flag)?)),
                "--rpc-url" => parsed.rpc_url = Some(value(&flag)?),
                "--contract" => parsed.contract_address = Some(value(&flag)?),
                "--device" => parsed.device_id = Some(value(&flag)?),
                "--poll-interval-ms" => {
                    parsed.poll_interval_ms = Some(parse_number("poll_interval_ms", &value(&flag)?)?);
                }
                "--max-block-range" => {
                    parsed.max_block_range = Some(parse_number("max_block_range", &value(&flag)?)?);
                }
                "--backend" => parsed.backend = Some(value(&flag)?.parse()?),
                "--on-poll-error" => parsed.on_poll_error = Some(value(&flag)?.parse()?),
                "--sync-on-start" => parsed.sync_on_start = true,
                "--help" | "-h" => parsed.help = true,
                _ => return Err(ConfigError::UnknownFlag(flag)),
            }
        }

        Ok(parsed)
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// Parses a contract address. Case is not checked; the result is shown in
/// checksummed form.
pub fn parse_contract_address(value: &str) -> Result<Address, ConfigError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| ConfigError::InvalidContractAddress {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parses a device id: decimal digits only, surrounding whitespace ignored.
pub fn parse_device_id(value: &str) -> Result<U256, ConfigError> {
    let digits = value.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::InvalidDeviceId(value.to_string()));
    }
    U256::from_str_radix(digits, 10).map_err(|_| ConfigError::InvalidDeviceId(value.to_string()))
}

/// Asks for the device id on `output` and reads one line from `input`.
pub fn prompt_device_id<R, W>(input: &mut R, output: &mut W) -> Result<U256, ConfigError>
where
    R: BufRead,
    W: Write,
{
    output
        .write_all(DEVICE_ID_PROMPT.as_bytes())
        .and_then(|()| output.flush())
        .map_err(ConfigError::Prompt)?;

    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(ConfigError::Prompt)?;
    if read == 0 {
        return Err(ConfigError::MissingDeviceId);
    }
    parse_device_id(&line)
}

/// Fully resolved bridge configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// RPC endpoint URL.
    pub rpc_url: String,
    /// PinController address.
    pub contract_address: Address,
    /// Device to follow; `None` means ask on stdin.
    pub device_id: Option<U256>,
    /// Pause between polls.
    pub poll_interval: Duration,
    /// `eth_getLogs` span.
    pub max_block_range: u64,
    /// GPIO backend.
    pub backend: BackendKind,
    /// Poll failure policy.
    pub on_poll_error: PollErrorPolicy,
    /// Read current pin status from the contract before listening.
    pub sync_on_start: bool,
    /// Pin mapping.
    pub pins: PinMapping,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            contract_address: DEFAULT_CONTRACT_ADDRESS,
            device_id: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
            backend: BackendKind::default(),
            on_poll_error: PollErrorPolicy::default(),
            sync_on_start: false,
            pins: PinMapping::default(),
        }
    }
}

impl BridgeConfig {
    /// Applies file, environment and flags over the defaults.
    ///
    /// # Arguments
    ///
    /// * `file` - Parsed config file, if one was given
    /// * `lookup` - Environment lookup (`std::env::var(..).ok()` in the binary)
    /// * `cli` - Parsed flags
    pub fn resolve<E>(file: Option<FileConfig>, lookup: E, cli: &CliArgs) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let file = file.unwrap_or_default();

        let rpc_url = cli
            .rpc_url
            .clone()
            .or_else(|| lookup(env::RPC_URL))
            .or(file.rpc_url);
        if let Some(url) = rpc_url {
            config.rpc_url = url;
        }

        let contract = cli
            .contract_address
            .clone()
            .or_else(|| lookup(env::CONTRACT_ADDRESS))
            .or(file.contract_address);
        if let Some(address) = contract {
            config.contract_address = parse_contract_address(&address)?;
        }

        if let Some(id) = cli.device_id.clone().or_else(|| lookup(env::DEVICE_ID)) {
            config.device_id = Some(parse_device_id(&id)?);
        } else if let Some(id) = file.device_id {
            config.device_id = Some(match id {
                DeviceIdValue::Number(n) => U256::from(n),
                DeviceIdValue::Text(text) => parse_device_id(&text)?,
            });
        }

        if let Some(ms) = cli.poll_interval_ms.or(file.poll_interval_ms) {
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Some(range) = cli.max_block_range.or(file.max_block_range) {
            if range == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "max_block_range",
                    value: range.to_string(),
                });
            }
            config.max_block_range = range;
        }

        if let Some(backend) = cli.backend.or(file.backend) {
            config.backend = backend;
        }
        if let Some(policy) = cli.on_poll_error.or(file.on_poll_error) {
            config.on_poll_error = policy;
        }
        config.sync_on_start = cli.sync_on_start || file.sync_on_start.unwrap_or(false);

        if let Some(pins) = file.pins {
            let entries = pins
                .into_iter()
                .map(|(pin, label)| {
                    pin.trim()
                        .parse::<u8>()
                        .map(|pin| (pin, label))
                        .map_err(|_| ConfigError::InvalidPin(pin))
                })
                .collect::<Result<Vec<_>, _>>()?;
            config.pins = PinMapping::new(entries)?;
        }

        Ok(config)
    }

    /// Listener settings for `device_id`.
    #[must_use]
    pub fn listener_config(&self, device_id: U256) -> ListenerConfig {
        ListenerConfig {
            rpc_url: self.rpc_url.clone(),
            contract_address: self.contract_address,
            device_id,
            max_block_range: self.max_block_range,
        }
    }
}
