//! Serial Link Server
//!
//! Bridges a remote peer to a serial-attached device. The peer speaks
//! newline-delimited JSON-RPC on stdin/stdout; logs go to stderr.

mod arduino;
mod settings;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use arduino::ArduinoToolchain;
use clap::Parser;
use link_detect::usb_ids;
use link_detect::PortScanner;
use link_session::{SessionBackend, SessionHandle, TokioSerialDriver};
use link_sim::{ScriptedToolchain, VirtualBus, VirtualDeviceConfig};
use settings::Settings;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Path of the virtual device served when simulating without configured devices
const DEFAULT_SIMULATED_PORT: &str = "/dev/ttySIM0";

#[derive(Parser, Debug)]
#[command(author, version, about = "Serial device link server speaking JSON-RPC over stdio", long_about = None)]
struct Args {
    /// Settings file (defaults to $XDG_CONFIG_HOME/serlink/settings.json)
    #[arg(long, env = "SERLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Serve virtual devices instead of real serial ports
    #[arg(long)]
    simulate: bool,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    save_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    ["serlink", "link_detect", "link_session", "link_sim"]
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Real ports, the tokio-serial driver and the Arduino tools
fn hardware_backend(settings: &Settings) -> SessionBackend {
    SessionBackend {
        enumerator: Arc::new(PortScanner::new()),
        driver: Arc::new(TokioSerialDriver::new()),
        toolchain: Arc::new(ArduinoToolchain::new(settings.toolchain.clone())),
    }
}

/// Virtual bus populated from the settings, with a scripted toolchain
fn simulated_backend(settings: &Settings) -> SessionBackend {
    let bus = VirtualBus::with_devices(&settings.simulated_devices);
    if settings.simulated_devices.is_empty() {
        bus.attach(
            VirtualDeviceConfig::new(DEFAULT_SIMULATED_PORT, usb_ids::arduino::UNO)
                .with_loopback(true),
        );
    }
    info!("Simulating devices: {}", bus.paths().join(", "));

    let toolchain = ScriptedToolchain::new()
        .watch_bus(bus.clone())
        .build_output(["Compiling sketch (simulated)"])
        .flash_output(["Writing flash (simulated)"]);
    SessionBackend {
        enumerator: Arc::new(bus.clone()),
        driver: Arc::new(bus),
        toolchain: Arc::new(toolchain),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(args.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };

    if args.save_config {
        let path = args
            .config
            .clone()
            .or_else(Settings::settings_path)
            .context("Could not determine settings path")?;
        settings.save_to(&path)?;
        info!("Settings written to {}", path.display());
        return Ok(());
    }

    let simulate = args.simulate || settings.simulate;
    info!(
        "Starting serlink ({})",
        if simulate { "simulated devices" } else { "serial ports" }
    );

    let backend = if simulate {
        simulated_backend(&settings)
    } else {
        hardware_backend(&settings)
    };
    let (session, outbound) = SessionHandle::spawn(backend, settings.session_config());

    let stdin = BufReader::new(tokio::io::stdin());
    transport::serve(session, outbound, stdin, tokio::io::stdout()).await?;

    info!("serlink stopped");
    Ok(())
}
