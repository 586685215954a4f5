//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Hot-reloadable rule sets and collect stores
#[derive(Parser)]
#[command(
    name = "rulewatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Hot-reloadable rule sets and collect stores",
    long_about = "Build the configured rule sets, hosts tables, collect actions and intel gates, \
                  then query them once or keep them live with file watching.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to a custom rulewatch.toml
    #[arg(short, long, global = true, env = "RULEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    #[command(about = "Create rulewatch.toml with defaults and commented examples")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display the merged settings (defaults, file, environment)")]
    Config,

    /// Query one plugin
    #[command(
        about = "Check a key against a domain set, ip set, hosts table or intel gate",
        after_help = "Examples:\n  rulewatch check ads tracker.example.com\n  rulewatch check lan 192.168.1.20\n  rulewatch check static router.home"
    )]
    Check {
        /// Plugin tag
        tag: String,
        /// Domain name or address
        key: String,
        /// Print a JSON object instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Feed a query name to a collect action
    #[command(about = "Run a collect action for a query name")]
    Collect {
        /// Collect action tag
        tag: String,
        /// Query name, e.g. ads.example.com.
        name: String,
    },

    /// Keep plugins live and answer queries from stdin
    #[command(
        about = "Watch rule files and answer `<tag> <key>` lines from stdin",
        after_help = "Input lines:\n  <tag> <key>    same as `rulewatch check`, or a collect action run\n\nEnd with EOF or Ctrl-C."
    )]
    Watch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["rulewatch", "--config", "x.toml", "check", "ads", "a.com"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Check { ref tag, ref key, json: false } if tag == "ads" && key == "a.com"));
    }
}
