use anyhow::Result;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use ingredient_intel::cli::{self, Cli};
use ingredient_intel::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_json);

    info!("Starting ingredient-intel");

    let config = AppConfig::from_env()?;
    if !cli::execute(cli, config).await? {
        std::process::exit(1);
    }

    Ok(())
}

/// Logs go to stderr so JSON output on stdout stays clean; `log` records are bridged.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
