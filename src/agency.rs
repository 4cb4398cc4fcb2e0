use anyhow::Context;
use clap::Parser;
use lottery::{
    client::{self, Agency},
    config::{self, AgencyConfig},
    signal::shutdown_signal,
};

async fn run(config: &AgencyConfig) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&config.bets_file)
        .await
        .with_context(|| format!("can't read {}", config.bets_file.display()))?;
    let bets = client::parse_records(config.id, &content);
    tracing::info!(action = "load_bets", result = "success", count = bets.len());

    let agency = Agency::new(
        config.id,
        config.server_address.clone(),
        config.retry_period(),
        config.max_retries,
    );

    let rejected = agency
        .send_bets(&bets, config.batch_max_amount as usize)
        .await?;
    if rejected > 0 {
        tracing::warn!(action = "send_bets", result = "fail", rejected);
    }

    agency.notify_done().await?;
    agency.wait_for_winners().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgencyConfig::parse();
    config::init_logging(&config.log_level)?;

    tracing::info!(
        action = "config",
        result = "success",
        id = config.id,
        server_address = %config.server_address,
        bets_file = %config.bets_file.display(),
        batch_max_amount = config.batch_max_amount,
        retry_period_ms = config.retry_period_ms,
        max_retries = config.max_retries,
        log_level = %config.log_level
    );

    tokio::select! {
        result = run(&config) => result,
        signal = shutdown_signal() => {
            let signal = signal?;
            tracing::info!(action = "signal", result = "success", signal, agency = config.id);
            Ok(())
        }
    }
}
