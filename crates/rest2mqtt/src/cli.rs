//! Clap derive structures for the `rest2mqtt` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// rest2mqtt -- declarative bridge between REST APIs and an MQTT broker
#[derive(Debug, Parser)]
#[command(
    name = "rest2mqtt",
    version,
    about = "Bridge REST APIs and an MQTT broker",
    long_about = "Drives REST endpoints from MQTT messages and publishes their \
        responses back to MQTT,\nas described by a declarative YAML configuration.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file
    #[arg(
        long,
        short = 'c',
        env = "REST2MQTT_CONFIG",
        default_value = rest2mqtt_config::DEFAULT_CONFIG_FILE,
        global = true
    )]
    pub config: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge until interrupted
    Run,

    /// Validate the configuration and show what the bridge would do
    Check,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_counts_flags() {
        let cli = Cli::try_parse_from(["rest2mqtt", "-vv", "check"]).unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn config_flag_overrides_default() {
        let cli = Cli::try_parse_from(["rest2mqtt", "run", "--config", "/etc/bridge.yml"]).unwrap();
        assert_eq!(cli.global.config, PathBuf::from("/etc/bridge.yml"));
    }
}
