//! Recommend command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::quota::QuotaGovernor;
use anyhow::Result;

/// Run the recommend command.
pub fn run_recommend(tokens: u64, budget: f64, settings: &Settings) -> Result<()> {
    if budget < 0.0 {
        anyhow::bail!("Budget must not be negative");
    }

    let governor = QuotaGovernor::new(&settings.quota);
    let model = governor.model_recommendation(tokens, budget);
    let cost = governor.estimate_cost(tokens, model);

    if cost <= budget {
        Output::success(&format!("Recommended model: {}", model));
    } else {
        Output::warning(&format!(
            "No model fits a ${:.4} budget; the cheapest is {}",
            budget, model
        ));
    }
    Output::kv("Tokens", &tokens.to_string());
    Output::kv("Estimated cost", &format!("${:.4}", cost));

    Ok(())
}
