//! 🚀 chx-cli: the front door, the bouncer, the maitre d' of chx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads config, sets up logging, then lets the library do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 📤 Slice a record source into chunks and publish them with a rotating routing key.
#[derive(Debug, Parser)]
#[command(name = "chx", version, about)]
struct Cli {
    /// TOML config file. When it does not exist, configuration comes from CHX_* env vars alone.
    #[arg(default_value = "chx.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 🔒 check the file exists before we get too emotionally attached
    let config_file = cli
        .config
        .try_exists()
        .context(format!(
            "💀 Couldn't check whether '{}' exists. If it's a relative path, try an absolute one.",
            cli.config.display()
        ))?
        .then_some(cli.config.as_path());

    let app_config = chx::app_config::load_config(config_file)
        .context("💀 Couldn't load the configuration. Check the file and the CHX_* variables.")?;

    // 💀 the part where we find out what went wrong, printed for 3am readability
    if let Err(err) = chx::run(app_config).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        std::process::exit(1);
    }

    Ok(())
}
