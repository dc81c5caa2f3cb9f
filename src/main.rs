//! Tolk CLI entry point.

use anyhow::Result;
use clap::Parser;
use tolk::cli::{commands, Cli, Commands};
use tolk::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("tolk={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    // Execute command
    match &cli.command {
        Commands::Analyze {
            input,
            format,
            service,
            output,
        } => {
            commands::run_analyze(input, format, service.as_deref(), output.as_deref(), settings)
                .await?;
        }

        Commands::Chunk {
            input,
            format,
            max_tokens,
            overlap_tokens,
            fixed,
        } => {
            commands::run_chunk(input, format, *max_tokens, *overlap_tokens, *fixed, &settings)?;
        }

        Commands::Quota { window, reset } => {
            commands::run_quota(window.as_deref(), *reset, &settings)?;
        }

        Commands::Recommend { tokens, budget } => {
            commands::run_recommend(*tokens, *budget, &settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, &settings, cli.config.as_deref())?;
        }
    }

    Ok(())
}
