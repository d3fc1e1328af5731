use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "service-alerter")]
#[command(about = "Threshold alerting for provisioned platform services")]
#[command(version)]
pub struct Cli {
    /// Config file path (TOML); environment variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the rule file path
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration with secrets masked
    Show {
        /// JSON output format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scan loop and status server (default)
    Run,

    /// Validate the rule file and dry-run every template
    #[command(name = "check-rules")]
    CheckRules {
        /// JSON output format
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["service-alerter"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "service-alerter",
            "check-rules",
            "--rules",
            "/etc/alerter/rules.json",
            "-v",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckRules { json: false })));
        assert_eq!(cli.rules, Some(PathBuf::from("/etc/alerter/rules.json")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_config_show_json() {
        let cli = Cli::try_parse_from(["service-alerter", "config", "show", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show { json: true }
            })
        ));
    }
}
