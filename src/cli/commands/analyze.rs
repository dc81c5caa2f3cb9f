//! Analyze command implementation.

use super::read_input;
use crate::cli::Output;
use crate::config::Settings;
use crate::error::TolkError;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the analyze command.
pub async fn run_analyze(
    input: &str,
    format: &str,
    service: Option<&str>,
    output: Option<&str>,
    settings: Settings,
) -> Result<()> {
    let (text, format) = read_input(input, format)?;
    Output::info(&format!("Analyzing {} ({})", input, format));

    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Analyzing transcript...");
    let outcome = tokio::select! {
        result = orchestrator.analyze(&text, format, service) => result,
        _ = tokio::signal::ctrl_c() => Err(TolkError::Cancelled),
    };
    spinner.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(TolkError::Cancelled) => {
            Output::warning("Analysis cancelled. Usage of completed calls was recorded.");
            return Err(TolkError::Cancelled.into());
        }
        Err(e @ TolkError::QuotaExceeded { .. }) => {
            Output::error(&format!("{}", e));
            Output::info("Check usage with 'tolk quota' or raise the limits in the config file.");
            return Err(e.into());
        }
        Err(e) => {
            Output::error(&format!("Analysis failed: {}", e));
            return Err(e.into());
        }
    };

    match output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&result)?;
            std::fs::write(path, json)?;
            Output::success(&format!(
                "Wrote analysis of {} chunks to {}",
                result.chunk_count, path
            ));
        }
        None => Output::analysis(&result),
    }

    Ok(())
}
