use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use evgate_server::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Cli::parse();
    evgate_core::config::load_dotenv();
    let config = evgate_core::Config::from_env();
    config.log_summary();

    match cli::dispatch(args.command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "command failed");
            ExitCode::from(2)
        }
    }
}
