//! unique-tcp: a line-protocol server for unique ids and tokens
//!
//! Clients send one command per line and get one response back:
//! - `ping`, `noop`, `version`
//! - `uuid`, `ulid`, `guid`, `tsid`, `txid`, `cuid`, `xuid`
//! - `bytes` (random bytes as lowercase hex)
//!
//! Anything else gets `error`. Idle connections are closed after the
//! configured timeout.

mod client;
mod commands;
mod config;
mod generator;
mod protocol;
mod server;

use clap::Parser;
use config::{CliArgs, Config};
use server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();

    let program = std::env::args()
        .next()
        .and_then(|arg| {
            std::path::Path::new(&arg)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "unique-tcp".to_string());
    println!("{} Version: {}", program, generator::version());

    if cli.version {
        return Ok(());
    }

    // Load configuration
    let config = Config::from_args(cli)?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        address = %config.listen_addr(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        bytes_length = config.bytes_length,
        "Starting unique-tcp server"
    );

    let server = Server::new(config);
    let listener = match server.bind() {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Failed to open listening socket");
            std::process::exit(1);
        }
    };

    server.run(listener).await;
    Ok(())
}
