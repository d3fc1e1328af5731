use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn handle_config_action(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { json } => {
            println!("{}", render_config(config, json)?);
        }
    }
    Ok(())
}

fn render_config(config: &Config, json: bool) -> Result<String> {
    let shown = config.redacted();
    if json {
        serde_json::to_string_pretty(&shown).context("Failed to serialize config to JSON")
    } else {
        toml::to_string_pretty(&shown).context("Failed to serialize config")
    }
}
