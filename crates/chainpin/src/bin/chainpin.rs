//! # CHAINPIN Bridge
//!
//! Follows one device on the PinController contract and drives the mapped
//! GPIO pins.
//!
//! ## Usage
//!
//! ```bash
//! chainpin --device 7 --backend rpi
//! RUST_LOG=chainpin=debug chainpin --config chainpin.toml
//! ```

use std::io;
use std::process::ExitCode;

use chainpin::config::prompt_device_id;
use chainpin::{Bridge, BridgeConfig, BridgeResult, BridgeSettings, CliArgs, FileConfig, Reconciler};
use chainpin_blockchain::PinEventFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    chainpin::logging::init();

    match start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "bridge stopped");
            eprintln!("FATAL: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn start() -> BridgeResult<()> {
    let cli = CliArgs::parse(std::env::args().skip(1))?;
    if cli.help {
        println!("{}", CliArgs::USAGE);
        return Ok(());
    }

    let file = cli.config_path.as_deref().map(FileConfig::load).transpose()?;
    let config = BridgeConfig::resolve(file, |key| std::env::var(key).ok(), &cli)?;

    let device_id = match config.device_id {
        Some(id) => id,
        None => prompt_device_id(&mut io::stdin().lock(), &mut io::stdout())?,
    };

    tracing::info!(
        rpc = %config.rpc_url,
        contract = %config.contract_address,
        device = %device_id,
        backend = ?config.backend,
        "starting bridge"
    );

    let filter = PinEventFilter::connect(&config.listener_config(device_id)).await?;

    let mut reconciler = Reconciler::new(config.pins.clone(), config.backend.open()?);
    reconciler.setup()?;

    println!("Listening for DevicePinStatusChanged events for device {device_id}");

    let mut bridge = Bridge::new(filter, reconciler, io::stdout(), BridgeSettings::from(&config));
    if config.sync_on_start {
        bridge.sync_initial_state().await;
    }

    match bridge.run().await? {}
}
