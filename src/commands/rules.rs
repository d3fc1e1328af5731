use anyhow::{Context, Result};
use std::path::Path;

use crate::alerts::{RuleCatalog, TemplateRenderer};
use crate::config::Config;
use crate::output::OutputFormat;

/// Load and dry-run the rule file. Returns `false` when any rule has a
/// problem so the caller can exit non-zero.
pub fn handle_check_rules_command(config: &Config, json_output: bool) -> Result<bool> {
    let path = Path::new(&config.rules.path);
    let catalog = RuleCatalog::load(path)
        .with_context(|| format!("Failed to load rules from {}", path.display()))?;

    let checks = catalog.check(&TemplateRenderer::new());
    let failing = checks.iter().filter(|c| !c.problems.is_empty()).count();

    if json_output {
        println!("{}", checks.to_json()?);
    } else {
        println!("{}", checks.to_table());
        println!(
            "\n{} rules across {} service types, {} with problems",
            checks.len(),
            catalog.labels().len(),
            failing
        );
    }

    Ok(failing == 0)
}
