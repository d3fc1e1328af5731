// Command handlers module
pub mod config;
pub mod rules;
pub mod run;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{Config, EnvSource};

pub use config::handle_config_action;
pub use rules::handle_check_rules_command;
pub use run::handle_run_command;

/// Build the effective configuration: defaults, then the optional TOML file,
/// then the environment, then command-line overrides.
pub fn load_config(
    config_path: Option<&Path>,
    rules_path: Option<&Path>,
    env: &impl EnvSource,
) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => Config::default(),
    };

    config
        .apply_env(env)
        .context("Failed to apply environment configuration")?;

    if let Some(rules) = rules_path {
        config.set_value("rules.path", &rules.display().to_string())?;
    }
    Ok(config)
}
