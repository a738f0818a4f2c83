//! Deepstyle CLI
//!
//! Operator tool for inspecting and nudging job documents in the deepstyle
//! database: show a job, move its state, record failure details, and manage
//! its attachments.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "deepstyle")]
#[command(about = "Deepstyle job document CLI", long_about = None)]
struct Cli {
    /// Database URL, including the database name
    #[arg(
        long,
        env = "DEEPSTYLE_DATABASE_URL",
        default_value = "http://localhost:5984/deepstyle"
    )]
    database_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "DEEPSTYLE_REQUEST_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Writes attempted before a conflicting update gives up
    #[arg(long, env = "DEEPSTYLE_MAX_ATTEMPTS", default_value_t = 10)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deepstyle=info,deepstyle_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        database_url: cli.database_url,
        request_timeout_secs: cli.timeout,
        max_attempts: cli.max_attempts,
    };

    handle_command(cli.command, &config).await
}
