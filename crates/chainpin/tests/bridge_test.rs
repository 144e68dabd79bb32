//! # Bridge Tests
//!
//! End-to-end runs of the poll loop against a scripted event source and the
//! simulated pin header.
//!
//! Run with: cargo test -p chainpin --test bridge_test

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::U256;
use alloy_transport::TransportErrorKind;
use chainpin::config::parse_device_id;
use chainpin::{
    Bridge, BridgeConfig, BridgeError, BridgeSettings, CliArgs, ConfigError, PinMapping,
    PollErrorPolicy, Reconciler,
};
use chainpin_blockchain::{EventSimulator, ListenerError, RawLog};
use chainpin_gpio::{Level, SimulatedPins};
use proptest::prelude::*;

const DEVICE: u64 = 7;

/// Console sink that stays readable after the bridge takes ownership.
#[derive(Clone, Default)]
struct Console(Arc<Mutex<Vec<u8>>>);

impl Console {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect()
    }
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn event(pin: u8, status: u8) -> RawLog {
    RawLog::pin_status_changed(U256::from(DEVICE), pin, status)
}

fn echo(pin: u8, status: u8) -> String {
    format!("PinStatusChanged event: {{deviceId: {DEVICE}, pin: {pin}, status: {status}}}")
}

fn transport_error(message: &'static str) -> ListenerError {
    ListenerError::Transport(TransportErrorKind::custom_str(message))
}

fn settings(policy: PollErrorPolicy) -> BridgeSettings {
    BridgeSettings {
        poll_interval: Duration::ZERO,
        on_poll_error: policy,
        stats_interval: Duration::from_secs(60),
    }
}

fn bridge(
    source: EventSimulator,
    policy: PollErrorPolicy,
) -> (Bridge<EventSimulator, SimulatedPins, Console>, Console) {
    let mut reconciler = Reconciler::new(PinMapping::reference(), SimulatedPins::recording());
    reconciler.setup().unwrap();
    let console = Console::default();
    (Bridge::new(source, reconciler, console.clone(), settings(policy)), console)
}

// ============================================================================
// SINGLE EVENTS
// ============================================================================

#[tokio::test]
async fn fan_turns_on() {
    let mut source = EventSimulator::new();
    source.push_batch(vec![event(14, 1)]);
    let (mut bridge, console) = bridge(source, PollErrorPolicy::Retry);

    assert_eq!(bridge.poll_once().await.unwrap(), 1);

    assert_eq!(console.lines(), vec![echo(14, 1), "Room 1 Fan ON".to_string()]);
    assert_eq!(bridge.reconciler().gpio().level(14), Some(Level::High));
    assert_eq!(bridge.reconciler().gpio().history(), &[(14, Level::High)]);
}

#[tokio::test]
async fn light_turns_off() {
    let mut source = EventSimulator::new();
    source.push_batch(vec![event(25, 0)]);
    let (mut bridge, console) = bridge(source, PollErrorPolicy::Retry);

    bridge.poll_once().await.unwrap();

    assert_eq!(console.lines(), vec![echo(25, 0), "Room 3 Light OFF".to_string()]);
    assert_eq!(bridge.reconciler().gpio().level(25), Some(Level::Low));
}

#[tokio::test]
async fn unmapped_pin_is_skipped() {
    let mut source = EventSimulator::new();
    source.push_batch(vec![event(99, 1)]);
    let (mut bridge, console) = bridge(source, PollErrorPolicy::Retry);

    bridge.poll_once().await.unwrap();

    assert_eq!(
        console.lines(),
        vec![echo(99, 1), "Pin 99 is not mapped to a room. Skipping...".to_string()]
    );
    assert!(bridge.reconciler().gpio().history().is_empty());
    assert_eq!(bridge.reconciler().stats().unmapped, 1);
}

#[tokio::test]
async fn empty_poll_prints_nothing() {
    let (mut bridge, console) = bridge(EventSimulator::new(), PollErrorPolicy::Retry);

    assert_eq!(bridge.poll_once().await.unwrap(), 0);
    assert!(console.lines().is_empty());
    assert_eq!(bridge.totals().listener.polls, 1);
}

// ============================================================================
// FAULT ISOLATION
// ============================================================================

#[tokio::test]
async fn malformed_log_does_not_stop_the_batch() {
    let mut broken = event(15, 1);
    broken.data.truncate(4);

    let mut source = EventSimulator::new();
    source.push_batch(vec![event(14, 1), broken, event(18, 1)]);
    source.push_batch(vec![event(14, 0)]);
    let (mut bridge, console) = bridge(source, PollErrorPolicy::Retry);

    bridge.poll_once().await.unwrap();
    bridge.poll_once().await.unwrap();

    let lines = console.lines();
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[0], echo(14, 1));
    assert_eq!(lines[1], "Room 1 Fan ON");
    assert!(lines[2].starts_with("An error occurred: "), "{}", lines[2]);
    assert_eq!(lines[3], echo(18, 1));
    assert_eq!(lines[4], "Room 2 Fan ON");
    assert_eq!(lines[5], echo(14, 0));
    assert_eq!(lines[6], "Room 1 Fan OFF");

    let gpio = bridge.reconciler().gpio();
    assert_eq!(gpio.level(15), None);
    assert_eq!(gpio.level(14), Some(Level::Low));
    assert_eq!(bridge.reconciler().stats().errors, 1);
    assert_eq!(bridge.reconciler().stats().applied, 3);
}

#[tokio::test]
async fn events_apply_in_order() {
    let mut source = EventSimulator::new();
    source.push_batch(vec![event(23, 1), event(23, 0), event(23, 1)]);
    let (mut bridge, _console) = bridge(source, PollErrorPolicy::Retry);

    bridge.poll_once().await.unwrap();

    assert_eq!(
        bridge.reconciler().gpio().history(),
        &[(23, Level::High), (23, Level::Low), (23, Level::High)]
    );
}

#[tokio::test]
async fn totals_combine_source_and_reconciler() {
    let mut source = EventSimulator::new();
    source.push_batch(vec![event(14, 1), event(99, 0)]);
    source.push_batch(vec![]);
    let (mut bridge, _console) = bridge(source, PollErrorPolicy::Retry);

    bridge.poll_once().await.unwrap();
    bridge.poll_once().await.unwrap();

    let totals = bridge.totals();
    assert_eq!(totals.listener.polls, 2);
    assert_eq!(totals.listener.logs_received, 2);
    assert_eq!(totals.reconcile.applied, 1);
    assert_eq!(totals.reconcile.unmapped, 1);
    assert!(bridge.source().is_drained());
}

// ============================================================================
// POLL FAILURES
// ============================================================================

#[tokio::test]
async fn poll_error_surfaces_from_poll_once() {
    let mut source = EventSimulator::new();
    source.push_error(transport_error("connection refused"));
    let (mut bridge, console) = bridge(source, PollErrorPolicy::Retry);

    assert!(bridge.poll_once().await.is_err());
    assert!(console.lines().is_empty());

    let totals = bridge.totals();
    assert_eq!(totals.listener.polls, 0);
    assert_eq!(totals.listener.poll_errors, 1);
}

#[tokio::test]
async fn exit_policy_stops_the_loop() {
    let mut source = EventSimulator::new();
    source.push_batch(vec![event(14, 1)]);
    source.push_error(transport_error("filter not found"));
    let (bridge, console) = bridge(source, PollErrorPolicy::Exit);

    let result = tokio::time::timeout(Duration::from_secs(5), bridge.run())
        .await
        .expect("exit policy must return");

    assert!(matches!(result, Err(BridgeError::Listener(ListenerError::Transport(_)))));
    assert_eq!(console.lines(), vec![echo(14, 1), "Room 1 Fan ON".to_string()]);
}

#[tokio::test]
async fn retry_policy_keeps_running() {
    let mut source = EventSimulator::new();
    source.push_error(transport_error("connection refused"));
    source.push_batch(vec![event(24, 1)]);
    let (bridge, console) = bridge(source, PollErrorPolicy::Retry);

    // The loop never returns under retry; the timeout ends it.
    let result = tokio::time::timeout(Duration::from_secs(2), bridge.run()).await;
    assert!(result.is_err());

    let lines = console.lines();
    assert!(lines[0].starts_with("An error occurred while polling: "), "{}", lines[0]);
    assert_eq!(lines[1], echo(24, 1));
    assert_eq!(lines[2], "Room 3 Fan ON");
}

// ============================================================================
// INITIAL SYNC
// ============================================================================

#[tokio::test]
async fn sync_applies_contract_state() {
    let mut source = EventSimulator::new();
    for pin in [14, 15, 18, 23, 24] {
        source.set_pin_status(pin, u8::from(pin % 2 == 0));
    }
    // Pin 25 has no answer: reported and skipped.
    let (mut bridge, console) = bridge(source, PollErrorPolicy::Retry);

    assert_eq!(bridge.sync_initial_state().await, 5);

    let lines = console.lines();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "Room 1 Fan ON");
    assert_eq!(lines[1], "Room 1 Light OFF");
    assert!(lines[5].starts_with("An error occurred: pin 25"), "{}", lines[5]);

    let gpio = bridge.reconciler().gpio();
    assert_eq!(gpio.level(14), Some(Level::High));
    assert_eq!(gpio.level(15), Some(Level::Low));
    assert_eq!(gpio.level(25), None);
    assert_eq!(bridge.reconciler().stats().errors, 1);
}

// ============================================================================
// STARTUP FAILURES
// ============================================================================

#[test]
fn non_numeric_device_id_is_fatal() {
    assert!(matches!(parse_device_id("abc"), Err(ConfigError::InvalidDeviceId(_))));

    let lookup = |key: &str| (key == "DEVICE_ID").then(|| "abc".to_string());
    let result = BridgeConfig::resolve(None, lookup, &CliArgs::default());
    assert!(matches!(result, Err(ConfigError::InvalidDeviceId(_))));
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn only_mapped_pins_are_written(pin in any::<u8>(), status in any::<u8>()) {
        let mut reconciler = Reconciler::new(PinMapping::reference(), SimulatedPins::recording());
        reconciler.setup().unwrap();

        reconciler.handle(&event(pin, status)).unwrap();

        let history = reconciler.gpio().history();
        if PinMapping::reference().contains(pin) {
            let expected = if status == 0 { Level::Low } else { Level::High };
            prop_assert_eq!(history, &[(pin, expected)][..]);
        } else {
            prop_assert!(history.is_empty());
        }
    }
}
