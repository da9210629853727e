//! `bashpilot config` — show the effective configuration.

use bashpilot_config::AppConfig;

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render(config)?);
    Ok(())
}

fn render(config: &AppConfig) -> Result<String, Box<dyn std::error::Error>> {
    Ok(config.redacted().to_toml()?)
}
