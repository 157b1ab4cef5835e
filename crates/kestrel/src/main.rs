//! `kestreld`: runs a Kestrel server.
//!
//! ```text
//! kestreld [config.json]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use kestrel::{Config, KestrelError, ServerBuilder};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), KestrelError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(%path, "loading configuration");
            Config::load(&path)?
        }
        None => Config::default(),
    };

    ServerBuilder::new().config(config).build().await?.run().await
}
