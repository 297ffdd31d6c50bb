//! coord-fixture: run one embedded coordination server standalone
//!
//! Starts the same server the test fixture shares between tests, so it can be
//! poked at by hand (websocat, a client from another process, `/health`).
//!
//! Usage:
//!   coord-fixture                          # Port 9500 on 127.0.0.1
//!   coord-fixture --port 0                 # OS-assigned port
//!   coord-fixture --log-file fixture.log   # Log to a file instead of stderr

use std::path::PathBuf;

use clap::Parser;
use coord_fixture_rule::{DEFAULT_HOST, DEFAULT_PORT};
use coord_server::{EmbeddedServer, ServerConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "coord-fixture", about = "Embedded coordination server for tests")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value_t = DEFAULT_PORT as u16)]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    hostname: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "64")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));

    if let Some(ref log_path) = cli.log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = match std::fs::OpenOptions::new().create(true).append(true).open(log_path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ServerConfig {
        hostname: cli.hostname.clone(),
        max_connections: Some(cli.max_connections),
        verbose_logging: cli.verbose,
        ..ServerConfig::new(cli.port)
    };

    let mut server = match EmbeddedServer::start(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                Embedded Coordination Server                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Address:    {}", server.local_addr());
    println!("  WebSocket:  ws://{}/ws", server.connect_string());
    println!("  Health:     http://{}/health", server.connect_string());
    println!("  Max conns:  {}", cli.max_connections);
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
    }

    println!();
    println!("  Shutting down...");
    if let Err(e) = server.stop().await {
        error!("Shutdown failed: {e}");
        std::process::exit(1);
    }
    println!("  Server stopped.");
}
