//! `fieldclock` binary entry point.

use anyhow::Context;
use clap::Parser;
use fieldclock_app::{execute, AppContext, Cli};
use fieldclock_domain::Config;
use fieldclock_infra::{config, observability::logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = load_config(&cli)?;
    logging::init(&config.logging).context("failed to initialise logging")?;

    let mut ctx = AppContext::new(config).context("failed to initialise application")?;
    execute(&mut ctx, cli.command).await?;
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            let config = config::load_from_file(Some(path.clone()))?;
            config.validate()?;
            config
        }
        None => config::load()?,
    };
    Ok(config)
}
