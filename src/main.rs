use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lottery::{
    config::{self, ServerConfig},
    server::Server,
    signal::shutdown_signal,
    storage::FileStore,
    systems::Lottery,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    config::init_logging(&config.log_level)?;

    tracing::info!(
        action = "config",
        result = "success",
        address = %config.address,
        agencies = config.agencies,
        max_batch_size = config.max_batch_size,
        winning_number = config.winning_number,
        bets_file = %config.bets_file.display(),
        log_level = %config.log_level
    );

    let store = FileStore::open(&config.bets_file)
        .await
        .with_context(|| format!("can't open {}", config.bets_file.display()))?;
    let lottery = Lottery::new(config.settings(), Arc::new(store));

    let server = Server::bind(config.address.as_str(), lottery)
        .await
        .with_context(|| format!("can't listen on {}", config.address))?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => {
                tracing::info!(action = "signal", result = "success", signal);
                shutdown.shutdown();
            }
            Err(err) => tracing::error!(action = "signal", result = "fail", error = %err),
        }
    });

    server.run().await
}
