//! # Bridge Loop
//!
//! Poll, apply, sleep, forever.
//!
//! ```text
//!        ┌──────────────────────────── poll_interval ───────────────┐
//!        ▼                                                          │
//!   ┌─────────┐  Vec<RawLog>  ┌──────────────┐  one log at a time  ┌┴───────────┐
//!   │  poll   │ ────────────▶ │  for each    │ ──────────────────▶ │ Reconciler │
//!   └────┬────┘               └──────────────┘                     └────────────┘
//!        │ Err
//!        ▼
//!   retry with backoff | exit
//! ```
//!
//! A failure on one log is reported and the rest of the batch still runs.

use std::convert::Infallible;
use std::io::Write;
use std::time::{Duration, Instant};

use chainpin_blockchain::{
    EventParser, EventSource, ListenerError, ListenerTotals, PinStatus, PinStatusReader, RawLog,
};
use chainpin_gpio::OutputPins;

use crate::config::{BridgeConfig, PollErrorPolicy};
use crate::error::{BridgeError, ReconcileError};
use crate::reconcile::{Outcome, ReconcileStats, Reconciler};

/// Floor for the first retry delay.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Ceiling for retry delays.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How often the loop logs its totals.
pub const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Loop timing and failure behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Pause after every successful poll. Zero only yields.
    pub poll_interval: Duration,
    /// What to do when a poll fails.
    pub on_poll_error: PollErrorPolicy,
    /// How often totals are logged.
    pub stats_interval: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            poll_interval: crate::config::DEFAULT_POLL_INTERVAL,
            on_poll_error: PollErrorPolicy::default(),
            stats_interval: STATS_INTERVAL,
        }
    }
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            on_poll_error: config.on_poll_error,
            stats_interval: STATS_INTERVAL,
        }
    }
}

/// Exponential backoff between failed polls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    /// Starts at `base` (at least [`MIN_RETRY_DELAY`]) and doubles up to `max`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(MIN_RETRY_DELAY).min(max);
        Self {
            base,
            max,
            current: None,
        }
    }

    /// Delay before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.base,
            Some(previous) => previous.saturating_mul(2).min(self.max),
        };
        self.current = Some(delay);
        delay
    }

    /// Back to the base delay after a successful poll.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Everything the loop counts, read at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeTotals {
    /// Event source counters.
    pub listener: ListenerTotals,
    /// Reconciler counters.
    pub reconcile: ReconcileStats,
}

/// The reconciliation loop.
///
/// `console` receives the operator-facing status lines; diagnostics go
/// through `tracing`.
pub struct Bridge<S, G, W> {
    source: S,
    reconciler: Reconciler<G>,
    console: W,
    settings: BridgeSettings,
    backoff: Backoff,
}

impl<S, G, W> Bridge<S, G, W>
where
    S: EventSource,
    G: OutputPins,
    W: Write,
{
    /// Wires a source to a reconciler that has already been set up.
    pub fn new(source: S, reconciler: Reconciler<G>, console: W, settings: BridgeSettings) -> Self {
        Self {
            source,
            reconciler,
            console,
            backoff: Backoff::new(settings.poll_interval, MAX_RETRY_DELAY),
            settings,
        }
    }

    /// Polls once and applies every returned log in order.
    ///
    /// Each decoded event is echoed before its outcome. Returns the number
    /// of logs seen. Per-log failures are reported on the console and do not
    /// make this fail; only the poll itself can.
    pub async fn poll_once(&mut self) -> Result<usize, ListenerError> {
        let logs = self.source.poll().await?;

        for log in &logs {
            let result = self.process(log);
            self.reconciler.record(&result);

            let line = match result {
                Ok(outcome) => outcome.to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, block = ?log.block_number, "event skipped");
                    format!("An error occurred: {e}")
                }
            };
            self.say(&line);
        }

        Ok(logs.len())
    }

    fn process(&mut self, log: &RawLog) -> Result<Outcome, ReconcileError> {
        let event = EventParser::parse_pin_status_changed(log)?;
        self.say(&format!("PinStatusChanged event: {event}"));
        Ok(self.reconciler.apply_event(&event)?)
    }

    /// Runs until the process is killed, or until a poll fails under
    /// [`PollErrorPolicy::Exit`].
    pub async fn run(mut self) -> Result<Infallible, BridgeError> {
        let mut last_stats = Instant::now();

        loop {
            match self.poll_once().await {
                Ok(_) => {
                    self.backoff.reset();
                    pause(self.settings.poll_interval).await;
                }
                Err(e) => match self.settings.on_poll_error {
                    PollErrorPolicy::Exit => return Err(e.into()),
                    PollErrorPolicy::Retry => {
                        let delay = self.backoff.next_delay();
                        tracing::warn!(error = %e, retry_in = ?delay, "poll failed");
                        self.say(&format!("An error occurred while polling: {e}"));
                        tokio::time::sleep(delay).await;
                    }
                },
            }

            if last_stats.elapsed() >= self.settings.stats_interval {
                self.log_stats();
                last_stats = Instant::now();
            }
        }
    }

    fn log_stats(&self) {
        let BridgeTotals { listener, reconcile } = self.totals();
        tracing::info!(
            polls = listener.polls,
            poll_errors = listener.poll_errors,
            logs = listener.logs_received,
            dropped = listener.logs_dropped,
            applied = reconcile.applied,
            unmapped = reconcile.unmapped,
            errors = reconcile.errors,
            "bridge stats"
        );
    }

    fn say(&mut self, line: &str) {
        if let Err(e) = writeln!(self.console, "{line}") {
            tracing::warn!(error = %e, "console write failed");
        }
    }

    /// Source and reconciler counters.
    #[must_use]
    pub fn totals(&self) -> BridgeTotals {
        BridgeTotals {
            listener: self.source.stats().totals(),
            reconcile: self.reconciler.stats(),
        }
    }

    /// The reconciler.
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler<G> {
        &self.reconciler
    }

    /// The event source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }
}

impl<S, G, W> Bridge<S, G, W>
where
    S: EventSource + PinStatusReader,
    G: OutputPins,
    W: Write,
{
    /// Reads every mapped pin's current status from the contract and applies
    /// it. Failures are reported per pin and skipped.
    ///
    /// Returns how many pins were applied.
    pub async fn sync_initial_state(&mut self) -> usize {
        let pins: Vec<u8> = self.reconciler.pins().pins().collect();
        let mut applied = 0;

        for pin in pins {
            let result = match self.source.read_pin_status(pin).await {
                Ok(raw) => self
                    .reconciler
                    .apply_status(pin, PinStatus::from_raw(raw))
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            self.reconciler.record(&result);

            match result {
                Ok(outcome) => {
                    applied += 1;
                    self.say(&outcome.to_string());
                }
                Err(e) => {
                    tracing::warn!(pin, error = %e, "initial sync failed");
                    self.say(&format!("An error occurred: pin {pin}: {e}"));
                }
            }
        }

        tracing::info!(applied, "initial pin state synced");
        applied
    }
}

async fn pause(interval: Duration) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(interval).await;
    }
}
