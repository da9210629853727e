//! `bashpilot chat` — the interactive session.

use bashpilot_agent::AgentLoop;
use bashpilot_channels::CliOperator;
use bashpilot_config::AppConfig;
use bashpilot_core::error::ProviderError;
use bashpilot_providers::{build_from_config, is_keyless};
use bashpilot_tools::ShellExecutor;
use std::sync::Arc;

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Fail early with setup instructions when no key is available
    if let Err(e) = check_credentials(&config) {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{}'!", config.default_provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export BASHPILOT_API_KEY=sk-...    (generic)");
        eprintln!("    export OPENAI_API_KEY=sk-...       (OpenAI)");
        eprintln!("    export OPENROUTER_API_KEY=sk-or-... (OpenRouter)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err(e.into());
    }

    let router = build_from_config(&config);
    let provider = router.default().ok_or_else(|| {
        ProviderError::NotConfigured(format!("no endpoint for '{}'", config.default_provider))
    })?;
    let executor = Arc::new(ShellExecutor::from_config(&config.shell));

    tracing::debug!(
        provider = %config.default_provider,
        model = %config.default_model,
        shell = %config.shell.program,
        "Starting chat"
    );

    let mut agent = AgentLoop::from_config(provider, executor, &config)?;
    let mut operator = CliOperator::stdio();
    agent.run(&mut operator).await?;

    Ok(())
}

fn check_credentials(config: &AppConfig) -> Result<(), ProviderError> {
    let has_key = config.has_api_key()
        || is_keyless(&config.default_provider)
        || config
            .providers
            .get(&config.default_provider)
            .is_some_and(|p| p.api_key.is_some());

    if has_key {
        Ok(())
    } else {
        Err(ProviderError::NotConfigured(format!(
            "no API key for '{}'",
            config.default_provider
        )))
    }
}
