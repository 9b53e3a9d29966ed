use anyhow::{Context, Result};
use chatlens_config::AppConfig;
use chatlens_main::{Cli, Runner, init_logging};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = init_logging(&config.storage.log_dir());

    Runner::new(config).run(cli.command).await
}
