//! Quota command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::quota::{LimitStatus, QuotaGovernor, WindowType};
use anyhow::Result;
use console::style;

/// Run the quota command.
pub fn run_quota(window: Option<&str>, reset: bool, settings: &Settings) -> Result<()> {
    let window: Option<WindowType> = window
        .map(|w| w.parse::<WindowType>().map_err(|e| anyhow::anyhow!("{}", e)))
        .transpose()?;

    let governor = QuotaGovernor::new(&settings.quota).with_ledger(settings.ledger_path())?;

    if reset {
        let removed = governor.reset(window)?;
        match window {
            Some(w) => Output::success(&format!("Removed {} {} usage records", removed, w)),
            None => Output::success(&format!("Cleared the usage ledger ({} records)", removed)),
        }
        return Ok(());
    }

    Output::header("Quota");
    let windows = match window {
        Some(w) => vec![w],
        None => WindowType::ALL.to_vec(),
    };
    for w in windows {
        print_status(&governor.limit_status(w)?, settings.quota.enforced_windows.contains(&w));
    }

    let stats = governor.usage_stats()?;
    if stats.total_requests > 0 {
        Output::header("Lifetime usage");
        Output::kv("Requests", &stats.total_requests.to_string());
        Output::kv("Tokens", &stats.total_tokens.to_string());
        Output::kv("Cost", &format!("${:.4}", stats.total_cost));
        for (model, usage) in &stats.by_model {
            Output::list_item(&format!(
                "{}: {} requests, {} tokens, ${:.4}",
                model, usage.requests, usage.tokens, usage.cost
            ));
        }

        let efficiency = governor.cost_efficiency(None)?;
        if efficiency.requests > 0 {
            Output::kv(
                "Average per request (last 30 days)",
                &format!(
                    "{:.0} tokens, ${:.4}",
                    efficiency.avg_tokens_per_request, efficiency.avg_cost_per_request
                ),
            );
        }
    }

    Ok(())
}

fn print_status(status: &LimitStatus, enforced: bool) {
    let ratio = status.token_ratio.max(status.cost_ratio);
    let label = format!("{}{}", status.window, if enforced { " (enforced)" } else { "" });
    let percent = format!("{:.0}%", ratio * 100.0);
    let percent = if ratio >= 1.0 {
        style(percent).red().bold()
    } else if ratio >= 0.8 {
        style(percent).yellow()
    } else {
        style(percent).green()
    };

    println!("\n  {} {}", style(label).bold(), percent);
    Output::kv(
        "Tokens",
        &format!("{} / {}", status.used_tokens, status.max_tokens),
    );
    Output::kv(
        "Cost",
        &format!("${:.4} / ${:.2}", status.used_cost, status.max_cost),
    );
    Output::kv("Resets in", &format_remaining(status.time_remaining));
}

fn format_remaining(remaining: chrono::Duration) -> String {
    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;
    if hours >= 24 {
        format!("{}d {}h", hours / 24, hours % 24)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(chrono::Duration::minutes(90)), "1h 30m");
        assert_eq!(format_remaining(chrono::Duration::hours(50)), "2d 2h");
    }
}
