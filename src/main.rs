use std::path::PathBuf;

use clap::Parser;
use rulewatch::cli::commands::{init, query, watch};
use rulewatch::cli::{Cli, Commands};
use rulewatch::config::{CONFIG_FILE, Settings};
use rulewatch::{PluginHost, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    if let Commands::Init { force } = cli.command {
        return init::run_init(&config_path, force);
    }

    let settings = Settings::load_from(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {}: {e}",
            config_path.display()
        )
    })?;
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Config => init::run_config(&settings),
        Commands::Check { tag, key, json } => {
            let host = PluginHost::build(&settings)?;
            let result = query::run_check(&host, &tag, &key, json).await;
            host.close();
            result
        }
        Commands::Collect { tag, name } => {
            let host = PluginHost::build(&settings)?;
            let result = query::run_collect(&host, &tag, &name);
            host.close();
            result
        }
        Commands::Watch => {
            let host = PluginHost::build(&settings)?;
            let result = watch::run_watch(&host).await;
            host.close();
            result
        }
    }
}
