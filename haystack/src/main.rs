//! Haystack daemon
//!
//! Usage:
//!   haystack --server 10.0.0.2 --port 54230 --capture-dir /var/lib/haystack
//!   haystack --config /etc/haystack.toml --verbose

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use haystack::{Backend, Devices, HaystackConfig, Node, ThreadSleeper};
use link_protocol::Endpoint;

const DEFAULT_FILTER: &str = "haystack=info,link_protocol=info,xband_devices=info";
const VERBOSE_FILTER: &str = "haystack=debug,link_protocol=debug,xband_devices=debug";

#[derive(Parser, Debug)]
#[command(
    name = "haystack",
    version,
    about = "X-band radio-link client for the ground station network"
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "HAYSTACK_CONFIG")]
    config: Option<PathBuf>,

    /// Server host
    #[arg(long, env = "HAYSTACK_SERVER")]
    server: Option<String>,

    /// Server port
    #[arg(long, env = "HAYSTACK_PORT")]
    port: Option<u16>,

    /// This node's endpoint identity (haystack, roof_xband, ...)
    #[arg(long, env = "HAYSTACK_ENDPOINT")]
    endpoint: Option<Endpoint>,

    /// Status report cadence in seconds
    #[arg(long, env = "HAYSTACK_POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Directory for raw burst captures
    #[arg(long, env = "HAYSTACK_CAPTURE_DIR")]
    capture_dir: Option<PathBuf>,

    /// Do not write burst captures
    #[arg(long)]
    no_capture: bool,

    /// Directory holding `<name>.ftr` filter profiles
    #[arg(long, env = "HAYSTACK_FILTER_DIR")]
    filter_dir: Option<PathBuf>,

    /// Device backend
    #[arg(long, value_enum, env = "HAYSTACK_BACKEND")]
    backend: Option<Backend>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut HaystackConfig) {
        if let Some(server) = &self.server {
            config.server.address = server.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(endpoint) = self.endpoint {
            config.node.endpoint = endpoint;
        }
        if let Some(secs) = self.poll_interval {
            config.status.poll_interval_secs = secs;
        }
        if let Some(dir) = &self.capture_dir {
            config.capture.directory = dir.clone();
        }
        if self.no_capture {
            config.capture.enabled = false;
        }
        if let Some(dir) = &self.filter_dir {
            config.radio.filter_directory = dir.clone();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    let mut config = HaystackConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let node = Node::spawn(&config, Devices::for_backend(config.backend), Arc::new(ThreadSleeper))
        .context("Failed to start node threads")?;

    let store = Arc::clone(node.store());
    ctrlc::set_handler(move || {
        info!("Signal received, shutting down");
        store.thread_status().shutdown();
    })
    .context("Failed to install signal handler")?;

    node.wait();
    let code = node.shutdown();
    info!(code, "Haystack stopped");
    std::process::exit(code);
}
