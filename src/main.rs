// service-alerter: threshold alerting for provisioned platform services
use clap::Parser;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use service_alerter::cli::{Cli, Commands};
use service_alerter::commands::{
    handle_check_rules_command, handle_config_action, handle_run_command, load_config,
};
use service_alerter::config::SystemEnv;

fn log_filter(verbose: bool, directives: &str) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives);
    if !verbose {
        return filter;
    }
    // Only this crate gets chattier; HTTP internals stay at their level.
    match "service_alerter=debug".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

fn init_tracing(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    tracing_subscriber::fmt::fmt()
        .with_env_filter(log_filter(verbose, &directives))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.rules.as_deref(), &SystemEnv)?;

    match cli.command {
        None | Some(Commands::Run) => handle_run_command(config).await?,
        Some(Commands::CheckRules { json }) => {
            if !handle_check_rules_command(&config, json)? {
                std::process::exit(1);
            }
        }
        Some(Commands::Config { action }) => handle_config_action(action, &config)?,
    }

    Ok(())
}
