//! FlashBus - An Asynchronous Modbus Server
//!
//! This is the main entry point for the FlashBus server.
//! It loads the configuration, builds the datastore, and runs the chosen
//! transport on a single-threaded Tokio runtime until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use flashbus::config::{ServerConfig, TransportMode};
use flashbus::framer::FramerKind;
use flashbus::server::{start_serial_server, start_tcp_server, start_udp_server, ServerContext};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command line options. Flags override the configuration file.
#[derive(Parser, Debug)]
#[command(name = "flashbus", version, about = "An asynchronous Modbus server")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport to serve on
    #[arg(short, long, value_enum)]
    mode: Option<TransportMode>,

    /// Host to bind to (tcp, udp)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (tcp, udp)
    #[arg(short, long)]
    port: Option<u16>,

    /// Serial device path (serial)
    #[arg(short, long)]
    device: Option<String>,

    /// Serial line speed (serial)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Framing: socket, rtu or ascii
    #[arg(short, long)]
    framer: Option<FramerKind>,

    /// Log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Loads the configuration file, if any, and applies the flags over it.
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };

        let server = &mut config.server;
        if let Some(mode) = self.mode {
            server.mode = mode;
        }
        if let Some(host) = self.host {
            server.host = host;
        }
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(device) = self.device {
            server.device = device;
        }
        if let Some(baud) = self.baud {
            server.baud_rate = baud;
        }
        if let Some(framer) = self.framer {
            server.framer = Some(framer);
        }

        Ok(config)
    }
}

fn log_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn,flashbus=info",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    })
}

fn print_banner(config: &ServerConfig) {
    let server = &config.server;
    let endpoint = match server.mode {
        TransportMode::Tcp | TransportMode::Udp => server.bind_address(),
        TransportMode::Serial => format!("{} @ {} baud", server.device, server.baud_rate),
    };
    println!(
        r#"
FlashBus v{} - Asynchronous Modbus Server
──────────────────────────────────────────────────────────────
Serving {} ({} framing) on {}
Units: {}

Use Ctrl+C to shutdown gracefully.
"#,
        flashbus::VERSION,
        server.mode,
        server.framer_kind(),
        endpoint,
        if config.single {
            "all (single mode)".to_string()
        } else {
            config
                .units
                .iter()
                .map(|unit| unit.id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = cli.into_config()?;

    // Build the datastore (shared across all connections)
    let store = config.build_store().context("building datastore")?;
    info!(units = store.len(), single = store.is_single(), "Datastore initialized");
    if store.is_empty() {
        warn!("No units configured, every request will fail");
    }

    let ctx = ServerContext::new(
        Arc::new(store),
        config.server.framer_kind(),
        config.identity.clone(),
    );

    print_banner(&config);

    // Everything runs on one cooperative event loop
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let server = &config.server;
    match server.mode {
        TransportMode::Tcp => start_tcp_server(&runtime, ctx, &server.bind_address(), shutdown)?,
        TransportMode::Udp => start_udp_server(&runtime, ctx, &server.bind_address(), shutdown)?,
        TransportMode::Serial => {
            start_serial_server(&runtime, ctx, &server.device, server.baud_rate, shutdown)?
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
