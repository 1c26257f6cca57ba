mod config;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use ai_monitor_core::collaborators::{ActivationGate, LogFacility, LogLevel, NetworkManager};
use ai_monitor_core::{Config, Service};
use clap::Parser;
use tracing::{error, info};

use crate::config::ConfigFile;

#[derive(Parser, Debug)]
#[command(name = "ai-monitor", about = "On-device AI session monitor TCP server")]
struct Args {
    /// Path to a JSON config file overriding the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Maximum number of concurrent observer connections.
    #[arg(long)]
    max_clients: Option<usize>,

    /// Log filter directive, e.g. "info" or "ai_monitor_core=debug".
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Stand-in for the platform network-readiness hook this core doesn't own.
/// A real firmware build wires in its network manager instead.
struct AlwaysReadyNetwork;
impl NetworkManager for AlwaysReadyNetwork {
    fn is_network_ready(&self) -> bool {
        true
    }
}

/// Stand-in for the platform IoT-activation hook this core doesn't own.
struct AlwaysActivated;
impl ActivationGate for AlwaysActivated {
    fn is_activated(&self) -> bool {
        true
    }
}

struct TracingLogFacility;
impl LogFacility for TracingLogFacility {
    fn emit(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }

    fn add_sink(&self, name: &str) {
        info!(name, "CUSTOM_LOG subscriber present, registering log sink");
    }

    fn remove_sink(&self, name: &str) {
        info!(name, "CUSTOM_LOG subscriber count dropped to zero, unregistering log sink");
    }
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    let mut cfg = Config::default();
    if let Some(path) = &args.config {
        match ConfigFile::load(path) {
            Ok(file) => cfg = file.merge_into(cfg),
            Err(err) => {
                error!(?err, path = %path.display(), "failed to load config file, using defaults");
            }
        }
    }
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(max_clients) = args.max_clients {
        cfg.max_clients = max_clients;
    }

    let mut service = match Service::new(cfg, AlwaysReadyNetwork, AlwaysActivated, TracingLogFacility) {
        Ok(service) => service,
        Err(err) => {
            error!(?err, "invalid monitor configuration");
            std::process::exit(1);
        }
    };

    info!("AI monitor starting");
    loop {
        if let Err(err) = service.poll_once() {
            error!(?err, "monitor poll loop error");
        }
        thread::sleep(Duration::from_millis(20));
    }
}
