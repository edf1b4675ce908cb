// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod signals;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};
use tunlink_config::{BridgeConfig, InterfaceMode, PingConfig};
use tunlink_core::devices::SystemOpener;
use tunlink_core::ping::{PingExchange, PingSettings};
use tunlink_core::{
    Bridge, BridgeReport, BridgeSettings, EndpointOpener, EndpointPair, StopCause, StopSignal,
};

use crate::signals::SignalWatcher;

const EXIT_OK: u8 = 0;
const EXIT_RELAY_FAILURE: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_OPEN_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "TunLink serial network bridge", long_about = None)]
struct Cli {
    /// Enable per-frame debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relay frames between a TUN/TAP interface and a serial port
    Bridge(BridgeArgs),
    /// Bounce counter bytes between two serial ports to check the wiring
    Ping(PingArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Tun,
    Tap,
}

impl From<ModeArg> for InterfaceMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Tun => InterfaceMode::Tun,
            ModeArg::Tap => InterfaceMode::Tap,
        }
    }
}

#[derive(Args, Debug)]
struct BridgeArgs {
    /// Path to the bridge config (YAML); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Virtual interface name
    #[arg(short, long)]
    interface: Option<String>,

    /// Virtual interface mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Serial device path
    #[arg(short, long)]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Relay buffer size per direction, e.g. 2048 or "2KiB"
    #[arg(long)]
    buffer_size: Option<String>,

    /// CPUs for the tun->serial and serial->tun workers, e.g. 2,3
    #[arg(long, value_delimiter = ',')]
    pin_cpus: Option<Vec<usize>>,

    /// Keep the packet information header on TUN/TAP frames
    #[arg(long)]
    packet_info: bool,
}

#[derive(Args, Debug)]
struct PingArgs {
    /// First serial port
    #[arg(long, default_value = tunlink_config::DEFAULT_SERIAL_PATH)]
    port_a: String,

    /// Second serial port
    #[arg(long, default_value = tunlink_config::DEFAULT_PEER_SERIAL_PATH)]
    port_b: String,

    /// Baud rate for both ports
    #[arg(short, long, default_value_t = tunlink_config::DEFAULT_BAUD)]
    baud: u32,

    /// Exchanges per direction (default: run until interrupted)
    #[arg(long)]
    count: Option<u64>,

    /// CPUs for the A->B and B->A threads, e.g. 2,3
    #[arg(long, value_delimiter = ',')]
    pin_cpus: Option<Vec<usize>>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    info!("Starting TunLink");

    let code = match cli.command {
        Command::Bridge(args) => run_bridge(args),
        Command::Ping(args) => run_ping(args),
    };
    ExitCode::from(code)
}

fn bridge_config(args: &BridgeArgs) -> anyhow::Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading bridge config: {:?}", path);
            BridgeConfig::from_file(path)?
        }
        None => BridgeConfig::default(),
    };

    if let Some(name) = &args.interface {
        config.interface.name = name.clone();
    }
    if let Some(mode) = args.mode {
        config.interface.mode = mode.into();
    }
    if args.packet_info {
        config.interface.packet_info = true;
    }
    if let Some(path) = &args.serial {
        config.serial.path = path.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud = baud;
    }
    if let Some(size) = &args.buffer_size {
        config.relay.buffer_size = Some(size.clone());
    }
    if let Some(cpus) = &args.pin_cpus {
        config.relay.pin_cpus = cpus.clone();
    }

    config.validate().context("Invalid bridge configuration")?;
    Ok(config)
}

fn run_bridge(args: BridgeArgs) -> u8 {
    let config = match bridge_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };
    let settings = BridgeSettings {
        // Already checked by validate().
        buffer_size: config
            .buffer_size()
            .unwrap_or(tunlink_config::DEFAULT_BUFFER_SIZE),
        pin_cpus: config.cpu_pair(),
        observers: Vec::new(),
    };

    let (stop, watcher) = match install_stop() {
        Ok(v) => v,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_RELAY_FAILURE;
        }
    };

    let pair = match EndpointPair::open(&SystemOpener, &config.interface, &config.serial) {
        Ok(pair) => pair,
        Err(e) => {
            error!("{}", e);
            watcher.shutdown();
            return EXIT_OPEN_ERROR;
        }
    };

    let result = Bridge::start(pair, settings, stop).and_then(|bridge| {
        debug!("Workers: {:?}", bridge.worker_states());
        bridge.wait()
    });
    watcher.shutdown();

    match result {
        Ok(report) => {
            log_report(&report);
            exit_code(&report.cause)
        }
        Err(e) => {
            error!("Bridge failed: {}", e);
            EXIT_RELAY_FAILURE
        }
    }
}

fn run_ping(args: PingArgs) -> u8 {
    let config = PingConfig {
        port_a: args.port_a,
        port_b: args.port_b,
        baud: args.baud,
        count: args.count,
        pin_cpus: args.pin_cpus.unwrap_or_default(),
    };
    if let Err(e) = config.validate() {
        error!("Invalid ping configuration: {:#}", e);
        return EXIT_CONFIG_ERROR;
    }

    let (stop, watcher) = match install_stop() {
        Ok(v) => v,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_RELAY_FAILURE;
        }
    };

    let opener = SystemOpener;
    let ports = opener
        .open_serial(&config.port_a, config.baud)
        .and_then(|a| Ok((a, opener.open_serial(&config.port_b, config.baud)?)));
    let (port_a, port_b) = match ports {
        Ok(ports) => ports,
        Err(e) => {
            error!("{}", e);
            watcher.shutdown();
            return EXIT_OPEN_ERROR;
        }
    };

    let settings = PingSettings {
        count: config.count,
        pin_cpus: config.cpu_pair(),
    };
    let result = PingExchange::run(port_a.clone(), port_b.clone(), &settings, stop);
    watcher.shutdown();
    port_a.close();
    port_b.close();

    match result {
        Ok(report) => {
            if !report.cause.is_clean() {
                error!("Ping exchange failed: {}", report.cause);
            }
            exit_code(&report.cause)
        }
        Err(e) => {
            error!("Ping exchange failed: {}", e);
            EXIT_RELAY_FAILURE
        }
    }
}

/// Process status for a run that stopped because of `cause`.
fn exit_code(cause: &StopCause) -> u8 {
    if cause.is_clean() {
        EXIT_OK
    } else {
        EXIT_RELAY_FAILURE
    }
}

fn install_stop() -> anyhow::Result<(Arc<StopSignal>, SignalWatcher)> {
    let stop = Arc::new(StopSignal::new().context("Failed to create stop signal")?);
    let watcher =
        SignalWatcher::install(stop.clone()).context("Failed to install signal handlers")?;
    Ok((stop, watcher))
}

fn log_report(report: &BridgeReport) {
    info!("Stopped: {}", report.cause);
    for (label, stats) in [
        ("tun->serial", &report.tun_to_serial),
        ("serial->tun", &report.serial_to_tun),
    ] {
        info!(
            "{}: {} bytes in {} reads, {} write calls ({} short)",
            label, stats.bytes, stats.reads, stats.write_calls, stats.short_writes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunlink_core::Direction;

    #[test]
    fn test_exit_code_for_stop_causes() {
        assert_eq!(exit_code(&StopCause::Signal(signal_hook::consts::SIGHUP)), EXIT_OK);
        assert_eq!(exit_code(&StopCause::Signal(signal_hook::consts::SIGTERM)), EXIT_OK);
        assert_eq!(exit_code(&StopCause::Completed), EXIT_OK);
        assert_eq!(exit_code(&StopCause::Requested), EXIT_OK);

        let relay = StopCause::Relay {
            direction: Direction::SerialToTun,
            reason: "/dev/ttyUSB0 reached end of stream".to_string(),
        };
        assert_eq!(exit_code(&relay), EXIT_RELAY_FAILURE);

        let ping = StopCause::Ping {
            leg: "A->B",
            reason: "Read from /dev/ttyUSB1 failed".to_string(),
        };
        assert_eq!(exit_code(&ping), EXIT_RELAY_FAILURE);
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "tunlink",
            "bridge",
            "--interface",
            "tl0",
            "--mode",
            "tap",
            "--buffer-size",
            "4KiB",
            "--pin-cpus",
            "2,3",
        ])
        .unwrap();
        let Command::Bridge(args) = cli.command else {
            panic!("expected the bridge subcommand");
        };

        let config = bridge_config(&args).unwrap();
        assert_eq!(config.interface.name, "tl0");
        assert_eq!(config.interface.mode, InterfaceMode::Tap);
        assert_eq!(config.buffer_size().unwrap(), 4096);
        assert_eq!(config.cpu_pair(), Some([2, 3]));
    }
}
