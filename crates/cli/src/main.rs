//! bashpilot CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive session (the default)
//! - `init`    — Write a default config file
//! - `config`  — Show the effective configuration

use bashpilot_config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "bashpilot",
    about = "A language model proposes shell commands; you approve them",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ~/.bashpilot/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Override the response token limit
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// Wait for whole responses instead of streaming them
    #[arg(long, global = true)]
    no_stream: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Start an interactive session
    Chat,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration, secrets redacted
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,
    },
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(AppConfig::config_path)
    }

    /// Load config and layer command-line overrides on top.
    fn load_config(&self) -> Result<AppConfig, Box<dyn std::error::Error>> {
        let mut config = AppConfig::load(Some(self.config_path().as_path()))
            .map_err(|e| format!("Failed to load config: {e}"))?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.default_model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if self.no_stream {
            config.stream = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the conversation
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command.as_ref().unwrap_or(&Commands::Chat) {
        Commands::Chat => commands::chat::run(cli.load_config()?).await?,
        Commands::Init { force } => commands::init::run(&cli.config_path(), *force)?,
        Commands::Config { path: true } => println!("{}", cli.config_path().display()),
        Commands::Config { path: false } => commands::config_cmd::show(&cli.load_config()?)?,
    }

    Ok(())
}
