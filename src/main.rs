use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use modsync::{config::CONFIG_FILE_NAME, Config};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// config file listing paths, timeouts and the mods to track. Defaults are used if it doesn't exist
    #[arg(long, short = 'c', default_value = CONFIG_FILE_NAME)]
    config: PathBuf,
    /// print the default config. save it and modify to your liking
    #[arg(long)]
    print_default_config: bool,
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        config,
        print_default_config,
    } = Cli::parse();
    setup_logging();

    if print_default_config {
        println!("{}", Config::write_default()?);
        return Ok(());
    }

    let config = Config::load(&config)
        .with_context(|| format!("loading config from [{}]", config.display()))?;
    let summary = modsync::run(&config).await.context("update run failed")?;

    for (name, outcome) in &summary.mods {
        if outcome.is_success() {
            info!("{name}: {outcome}");
        } else {
            warn!("{name}: {outcome}");
        }
    }
    info!(
        "Done. {} updated, {} skipped or failed, {} archives extracted",
        summary.updated(),
        summary.failed(),
        summary.extracted.len()
    );

    Ok(())
}
