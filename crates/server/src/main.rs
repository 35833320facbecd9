//! Cobble - Minecraft protocol server
//!
//! Usage: `cobble [path/to/serveroptions.txt]`
//!
//! Log output is controlled with `RUST_LOG` (default `info`).

use anyhow::Context;
use cobble_config::{ServerOptions, DEFAULT_OPTIONS_PATH};
use cobble_network::{EventLoopPool, Server};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Cobble {} starting up...", env!("CARGO_PKG_VERSION"));

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OPTIONS_PATH.to_string());
    info!("Loading configuration from {}", path);

    let options = ServerOptions::load_or_default(&path)
        .with_context(|| format!("Failed to load {}", path))?;
    options.display();

    let config = options.into_network_config()?;
    let pool = EventLoopPool::for_config("cobble-worker", &config);
    let server = Server::new(config).context("Failed to create server")?;

    let result = pool.block_on(server.run());

    // Stop the workers whether or not the server exited cleanly
    pool.shutdown();

    match result? {
        Ok(()) => {
            info!("Server shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
    }
}
