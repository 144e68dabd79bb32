//! # Event Listener
//!
//! Stateful subscription to `DevicePinStatusChanged` logs for one device.
//!
//! The node is polled with `eth_getLogs` over a block cursor: every poll
//! fetches `[cursor, head]` (capped at `max_block_range` blocks) and moves the
//! cursor past what it fetched. The cursor starts one block after the head
//! seen on connect, so nothing mined before the process started is replayed.
//!
//! ```text
//! ┌────────────┐  eth_getLogs  ┌────────────────┐  Vec<RawLog>  ┌────────────┐
//! │  RPC Node  │ ────────────▶ │ PinEventFilter │ ────────────▶ │ Reconciler │
//! └────────────┘               │    (cursor)    │               └────────────┘
//!                              └────────────────┘
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::{Filter, Log, TransactionInput, TransactionRequest};
use alloy_transport::{BoxTransport, TransportError};
use thiserror::Error;

use super::contracts::{PinController, PIN_STATUS_CHANGED_TOPIC};
use super::events::RawLog;

/// Configuration for the event listener.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// RPC endpoint URL.
    pub rpc_url: String,
    /// Contract address to watch.
    pub contract_address: Address,
    /// Device whose events are delivered.
    pub device_id: U256,
    /// Largest block span requested in a single `eth_getLogs` call.
    pub max_block_range: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: Address::ZERO,
            device_id: U256::ZERO,
            max_block_range: 500,
        }
    }
}

/// Statistics for the event listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Successful polls.
    pub polls: AtomicU64,
    /// Logs delivered to the caller.
    pub logs_received: AtomicU64,
    /// Logs dropped because they belong to another device.
    pub logs_dropped: AtomicU64,
    /// Polls that failed at the transport level.
    pub poll_errors: AtomicU64,
}

impl ListenerStats {
    /// Reads every counter.
    #[must_use]
    pub fn totals(&self) -> ListenerTotals {
        ListenerTotals {
            polls: self.polls.load(Ordering::Relaxed),
            logs_received: self.logs_received.load(Ordering::Relaxed),
            logs_dropped: self.logs_dropped.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }

    fn record_poll(&self, delivered: usize, dropped: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.logs_received.fetch_add(delivered as u64, Ordering::Relaxed);
        self.logs_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`ListenerStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenerTotals {
    /// Successful polls.
    pub polls: u64,
    /// Logs delivered to the caller.
    pub logs_received: u64,
    /// Logs dropped because they belong to another device.
    pub logs_dropped: u64,
    /// Polls that failed at the transport level.
    pub poll_errors: u64,
}

/// Listener errors.
#[derive(Error, Debug)]
pub enum ListenerError {
    /// Could not build a provider or reach the node on connect.
    #[error("cannot connect to {url}: {source}")]
    Connect {
        /// The endpoint that failed.
        url: String,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// An RPC call failed.
    #[error("rpc error: {0}")]
    Transport(#[from] TransportError),

    /// Contract returned data that does not match the ABI.
    #[error("bad contract return data: {0}")]
    Decode(#[from] alloy_sol_types::Error),
}

/// Anything that yields batches of new pin logs.
///
/// Each call returns only logs not returned by a previous call.
#[allow(async_fn_in_trait)]
pub trait EventSource {
    /// Returns logs observed since the previous poll (possibly none).
    async fn poll(&mut self) -> Result<Vec<RawLog>, ListenerError>;

    /// Counters kept by this source.
    fn stats(&self) -> &ListenerStats;
}

/// Point-in-time reads of on-chain pin status.
#[allow(async_fn_in_trait)]
pub trait PinStatusReader {
    /// Current raw `uint8` status of `pin` for the watched device.
    async fn read_pin_status(&self, pin: u8) -> Result<u8, ListenerError>;
}

/// The two node calls a [`PinEventFilter`] polls with.
#[allow(async_fn_in_trait)]
pub trait LogRpc {
    /// `eth_blockNumber`.
    async fn head_block(&mut self) -> Result<u64, TransportError>;

    /// `eth_getLogs`, in the node's order.
    async fn fetch_logs(&mut self, filter: &Filter) -> Result<Vec<RawLog>, TransportError>;
}

impl LogRpc for RootProvider<BoxTransport> {
    async fn head_block(&mut self) -> Result<u64, TransportError> {
        self.get_block_number().await
    }

    async fn fetch_logs(&mut self, filter: &Filter) -> Result<Vec<RawLog>, TransportError> {
        let logs = self.get_logs(filter).await?;
        Ok(logs.iter().map(RawLog::from).collect())
    }
}

/// Block cursor: the next block to fetch and how far one fetch may reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockCursor {
    next: u64,
    max_range: u64,
}

impl BlockCursor {
    /// Creates a cursor that will fetch `start` next.
    ///
    /// # Arguments
    ///
    /// * `start` - First block to fetch (inclusive)
    /// * `max_range` - Maximum blocks per fetch, clamped to at least 1
    #[must_use]
    pub fn new(start: u64, max_range: u64) -> Self {
        Self {
            next: start,
            max_range: max_range.max(1),
        }
    }

    /// Cursor for a subscription created while `head` was the latest block.
    /// Logs already in `head` are not delivered.
    #[must_use]
    pub fn after_head(head: u64, max_range: u64) -> Self {
        Self::new(head.saturating_add(1), max_range)
    }

    /// The next block that will be fetched.
    #[inline]
    #[must_use]
    pub const fn next_block(&self) -> u64 {
        self.next
    }

    /// Range to fetch given the current chain head, or `None` if the head
    /// has not reached the cursor yet.
    #[must_use]
    pub fn range_for_head(&self, head: u64) -> Option<RangeInclusive<u64>> {
        if head < self.next {
            return None;
        }
        let end = head.min(self.next.saturating_add(self.max_range - 1));
        Some(self.next..=end)
    }

    /// Moves the cursor past `last_fetched`. Never moves backwards.
    pub fn advance_past(&mut self, last_fetched: u64) {
        self.next = self.next.max(last_fetched.saturating_add(1));
    }
}

impl From<&Log> for RawLog {
    fn from(log: &Log) -> Self {
        Self {
            topics: log.topics().to_vec(),
            data: log.data().data.to_vec(),
            block_number: log.block_number,
            log_index: log.log_index,
        }
    }
}

/// Keeps only logs whose indexed device id equals `device_topic`.
///
/// Returns the kept logs and how many were dropped.
#[must_use]
pub fn retain_device(logs: Vec<RawLog>, device_topic: &B256) -> (Vec<RawLog>, usize) {
    let total = logs.len();
    let kept: Vec<RawLog> = logs
        .into_iter()
        .filter(|log| log.device_topic() == Some(device_topic))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

/// `DevicePinStatusChanged` subscription backed by an RPC node.
pub struct PinEventFilter<R = RootProvider<BoxTransport>> {
    /// Node connection.
    rpc: R,
    /// Contract and device being watched.
    controller: PinController,
    /// Next block to fetch.
    cursor: BlockCursor,
    /// Performance statistics.
    stats: ListenerStats,
}

impl PinEventFilter {
    /// Connects to the node over HTTP and anchors the cursor after the
    /// current head.
    ///
    /// Fails if the URL is unusable or the node cannot be reached. There is
    /// no retry here; callers treat this as fatal.
    pub async fn connect(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let provider = ProviderBuilder::new()
            .on_builtin(&config.rpc_url)
            .await
            .map_err(|source| ListenerError::Connect {
                url: config.rpc_url.clone(),
                source,
            })?;
        Self::with_rpc(provider, config).await
    }
}

impl<R: LogRpc> PinEventFilter<R> {
    /// Reads the head from `rpc` and starts the cursor one block after it.
    pub async fn with_rpc(mut rpc: R, config: &ListenerConfig) -> Result<Self, ListenerError> {
        let head = rpc
            .head_block()
            .await
            .map_err(|source| ListenerError::Connect {
                url: config.rpc_url.clone(),
                source,
            })?;

        tracing::info!(
            contract = %config.contract_address,
            device = %config.device_id,
            head,
            "event filter created"
        );

        Ok(Self {
            rpc,
            controller: PinController::new(config.contract_address, config.device_id),
            cursor: BlockCursor::after_head(head, config.max_block_range),
            stats: ListenerStats::default(),
        })
    }

    /// Current cursor position.
    #[must_use]
    pub const fn cursor(&self) -> &BlockCursor {
        &self.cursor
    }

    fn device_topic(&self) -> B256 {
        B256::from(self.controller.device_id.to_be_bytes::<32>())
    }

    fn filter_for(&self, range: &RangeInclusive<u64>) -> Filter {
        Filter::new()
            .address(self.controller.address)
            .event_signature(PIN_STATUS_CHANGED_TOPIC)
            .topic1(self.device_topic())
            .from_block(*range.start())
            .to_block(*range.end())
    }

    /// Fetches logs mined since the previous call.
    ///
    /// The cursor only moves after `eth_getLogs` succeeds, so a failed call
    /// is retried from the same block next time.
    pub async fn get_new_entries(&mut self) -> Result<Vec<RawLog>, ListenerError> {
        let result = self.fetch_new_entries().await;
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    async fn fetch_new_entries(&mut self) -> Result<Vec<RawLog>, ListenerError> {
        let head = self.rpc.head_block().await?;
        let Some(range) = self.cursor.range_for_head(head) else {
            self.stats.record_poll(0, 0);
            return Ok(Vec::new());
        };

        let filter = self.filter_for(&range);
        let logs = self.rpc.fetch_logs(&filter).await?;
        self.cursor.advance_past(*range.end());

        let (kept, dropped) = retain_device(logs, &self.device_topic());
        if dropped > 0 {
            tracing::debug!(dropped, "ignored logs for other devices");
        }
        self.stats.record_poll(kept.len(), dropped);

        tracing::trace!(
            from = *range.start(),
            to = *range.end(),
            logs = kept.len(),
            "polled"
        );
        Ok(kept)
    }
}

impl<R: LogRpc> EventSource for PinEventFilter<R> {
    async fn poll(&mut self) -> Result<Vec<RawLog>, ListenerError> {
        self.get_new_entries().await
    }

    fn stats(&self) -> &ListenerStats {
        &self.stats
    }
}

impl PinStatusReader for PinEventFilter {
    /// Calls `getDevicePinStatus` at the latest block.
    async fn read_pin_status(&self, pin: u8) -> Result<u8, ListenerError> {
        let calldata = Bytes::from(self.controller.encode_pin_status_call(pin));
        let request = TransactionRequest::default()
            .to(self.controller.address)
            .input(TransactionInput::new(calldata));

        let output = self.rpc.call(&request).await?;
        Ok(PinController::decode_pin_status_return(&output)?)
    }
}

/// Scripted event source for testing.
///
/// Each poll pops the next queued batch; once empty, polls return no logs.
#[derive(Debug, Default)]
pub struct EventSimulator {
    /// Queued poll results.
    batches: VecDeque<Result<Vec<RawLog>, ListenerError>>,
    /// Polls served so far, failed ones included.
    polls: u64,
    /// Answers for `read_pin_status`.
    pin_status: BTreeMap<u8, u8>,
    /// Same counters as the node-backed filter.
    stats: ListenerStats,
}

impl EventSimulator {
    /// Creates an empty simulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch of logs for a future poll.
    pub fn push_batch(&mut self, logs: Vec<RawLog>) {
        self.batches.push_back(Ok(logs));
    }

    /// Sets the on-chain status reported for `pin`.
    pub fn set_pin_status(&mut self, pin: u8, status: u8) {
        self.pin_status.insert(pin, status);
    }

    /// Queues a failing poll.
    pub fn push_error(&mut self, error: ListenerError) {
        self.batches.push_back(Err(error));
    }

    /// Number of polls served.
    #[must_use]
    pub const fn polls(&self) -> u64 {
        self.polls
    }

    /// Whether queued batches remain.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.batches.is_empty()
    }
}

impl EventSource for EventSimulator {
    async fn poll(&mut self) -> Result<Vec<RawLog>, ListenerError> {
        self.polls += 1;
        let result = self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()));
        match &result {
            Ok(logs) => self.stats.record_poll(logs.len(), 0),
            Err(_) => self.stats.record_error(),
        }
        result
    }

    fn stats(&self) -> &ListenerStats {
        &self.stats
    }
}

impl PinStatusReader for EventSimulator {
    async fn read_pin_status(&self, pin: u8) -> Result<u8, ListenerError> {
        self.pin_status.get(&pin).copied().ok_or_else(|| {
            ListenerError::Transport(alloy_transport::TransportErrorKind::custom_str(
                "execution reverted",
            ))
        })
    }
}
