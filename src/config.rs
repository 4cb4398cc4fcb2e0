use std::{path::PathBuf, time::Duration};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::systems::Settings;

/// Lottery server, collects the bets of every agency and runs the draw
#[derive(Parser, Debug, Clone)]
#[command(name = "lottery-server")]
pub struct ServerConfig {
    /// Address the server listens on
    #[arg(long, env = "SERVER_ADDRESS", default_value = "0.0.0.0:12345")]
    pub address: String,

    /// Number of agencies that have to finish before the draw
    #[arg(
        long,
        env = "AGENCIES_AMOUNT",
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub agencies: u32,

    /// Maximum number of bets accepted in a single batch
    #[arg(
        long,
        env = "MAX_BATCH_SIZE",
        default_value_t = 105,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_batch_size: u32,

    #[arg(long, env = "WINNING_NUMBER", default_value_t = 7574)]
    pub winning_number: i64,

    /// File every received bet is appended to
    #[arg(long, env = "BETS_FILE", default_value = "./bets.csv")]
    pub bets_file: PathBuf,

    /// Ignored when RUST_LOG is set
    #[arg(long, env = "LOGGING_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn settings(&self) -> Settings {
        Settings {
            agencies: self.agencies as usize,
            max_batch_size: self.max_batch_size as usize,
            winning_number: self.winning_number,
        }
    }
}

/// Agency client, uploads the bets of the agency and waits for its winners
#[derive(Parser, Debug, Clone)]
#[command(name = "agency")]
pub struct AgencyConfig {
    #[arg(long, env = "CLI_ID", value_parser = clap::value_parser!(u32).range(1..))]
    pub id: u32,

    #[arg(long, env = "CLI_SERVER_ADDRESS")]
    pub server_address: String,

    /// CSV file with the bets of the agency
    #[arg(long, env = "CLI_BETS_FILE", default_value = "./agency.csv")]
    pub bets_file: PathBuf,

    /// Maximum number of bets sent in a single batch
    #[arg(
        long,
        env = "CLI_BATCH_MAXAMOUNT",
        default_value_t = 105,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub batch_max_amount: u32,

    /// Time to wait between two queries for the winners
    #[arg(long, env = "CLI_LOOP_PERIOD_MS", default_value_t = 500)]
    pub retry_period_ms: u64,

    #[arg(long, env = "CLI_MAX_RETRIES", default_value_t = 120)]
    pub max_retries: u32,

    /// Ignored when RUST_LOG is set
    #[arg(long, env = "CLI_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl AgencyConfig {
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }
}

/// Installs the global subscriber, RUST_LOG takes precedence over `level`
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}
