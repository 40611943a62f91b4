//! devrig - bootloader discovery loop for the device registry
//!
//! This is the thin binary entry point: it wires configuration, logging,
//! the fastboot scanner, and the registry together and runs the periodic
//! reconciliation loop. Schedulers and connectivity listeners attach
//! through the `devrig-fleet` library API.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use devrig_core::prelude::*;
use devrig_fleet::{
    DeviceFactory, DeviceRegistry, FastbootScanner, FleetConfig, TokioCommandRunner,
};

/// Default config location, relative to the working directory
const DEFAULT_CONFIG: &str = "devrig.toml";

/// Track bootloader-mode devices in a shared registry
#[derive(Parser, Debug)]
#[command(name = "devrig")]
#[command(about = "Device-fleet registry for hardware test harnesses", long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the fastboot binary path
    #[arg(long, value_name = "PATH")]
    fastboot: Option<String>,

    /// Override the poll interval in seconds
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Run a single discovery pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    devrig_core::logging::init()?;
    let args = Args::parse();

    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = FleetConfig::load_or_default(&config_path);
    if let Some(path) = args.fastboot {
        config.fastboot.path = Some(path);
    }
    if let Some(secs) = args.poll_interval {
        config.fastboot.poll_interval_secs = secs;
    }

    let fastboot_path = match config.fastboot.resolve_path() {
        Ok(path) => path,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let scanner = FastbootScanner::new(fastboot_path, TokioCommandRunner)?;
    if !scanner.is_fastboot_available().await {
        eprintln!("Error: no usable fastboot binary; install platform tools or set fastboot.path");
        std::process::exit(1);
    }

    let registry = DeviceRegistry::new(
        DeviceFactory::from_config(&config.factory),
        TokioCommandRunner,
    )
    .with_ignored_serials(config.registry.ignored_serials.clone());

    let interval = Duration::from_secs(config.fastboot.poll_interval_secs.max(1));
    info!("Polling bootloader devices every {:?}", interval);

    loop {
        let snapshot = scanner.get_bootloader_and_fastbootd_devices().await;
        for (serial, &fastbootd) in &snapshot {
            registry.find_or_create_fastboot(serial, fastbootd);
        }
        registry.reconcile_bootloader(&snapshot);

        info!(
            "Reconciled {} bootloader serial(s), {} device(s) tracked",
            snapshot.len(),
            registry.size()
        );
        for device in registry.devices() {
            println!(
                "{}\t{}\t{}",
                device.serial(),
                device.connectivity(),
                device.allocation_state()
            );
        }

        if args.once {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    Ok(())
}
