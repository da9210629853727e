//! `bashpilot init` — write a default config file.

use bashpilot_config::AppConfig;
use std::path::Path;

pub fn run(config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually, or re-run with --force to overwrite.");
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(config_path, AppConfig::default_toml())?;
    tracing::debug!(path = %config_path.display(), force, "Wrote default config");

    println!("Created config at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Add your API key to {} (or export OPENAI_API_KEY)", config_path.display());
    println!("  2. Run: bashpilot");
    Ok(())
}
