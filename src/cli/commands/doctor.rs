//! Doctor command - verify configuration and API keys.

use crate::cli::Output;
use crate::config::Settings;
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Tolk Doctor");
    println!();
    println!("Checking configuration and API keys...\n");

    let mut checks = Vec::new();

    // Check LLM services
    println!("{}", style("LLM Services").bold());
    let service_checks = check_services(settings);
    for check in &service_checks {
        check.print();
    }
    checks.extend(service_checks);

    println!();

    // Check directories
    println!("{}", style("Data").bold());
    let dir_checks = check_directories(settings);
    for check in &dir_checks {
        check.print();
    }
    checks.extend(dir_checks);

    println!();

    // Check configuration
    println!("{}", style("Configuration").bold());
    let config_check = check_config_file();
    config_check.print();
    checks.push(config_check);

    println!();

    // Summary
    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Tolk.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!(
            "All checks passed with {} warning(s).",
            warnings
        ));
    } else {
        Output::success("All checks passed! Tolk is ready to use.");
    }

    Ok(())
}

/// One check per configured service, plus an error when none is usable.
fn check_services(settings: &Settings) -> Vec<CheckResult> {
    let mut results: Vec<CheckResult> = settings
        .llm
        .services
        .iter()
        .map(|(name, service)| {
            let label = format!("{} ({})", name, service.model);
            let is_default = name == &settings.llm.default_service;
            match service.resolve_api_key() {
                Some(key) => CheckResult::ok(
                    &label,
                    &format!(
                        "key configured ({}){}",
                        mask_key(&key),
                        if is_default { ", default" } else { "" }
                    ),
                ),
                None if is_default => CheckResult::error(
                    &label,
                    "default service has no API key",
                    &format!("Set with: export {}='...'", service.api_key_env),
                ),
                None => CheckResult::warning(
                    &label,
                    "no API key, service disabled",
                    &format!("Set with: export {}='...'", service.api_key_env),
                ),
            }
        })
        .collect();

    if !settings.llm.services.contains_key(&settings.llm.default_service) {
        results.push(CheckResult::error(
            "Default service",
            &format!("'{}' is not configured", settings.llm.default_service),
            "Set llm.default_service to one of the [llm.services] entries",
        ));
    }

    results
}

/// Show only the ends of a key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Check data directory and usage ledger.
fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let data_dir = settings.data_dir();
    if data_dir.exists() {
        results.push(CheckResult::ok(
            "Data directory",
            &format!("{}", data_dir.display()),
        ));
    } else {
        results.push(CheckResult::warning(
            "Data directory",
            &format!("{} (will be created)", data_dir.display()),
            "Directory will be created on first use",
        ));
    }

    if !settings.quota.persist_ledger {
        results.push(CheckResult::warning(
            "Usage ledger",
            "disabled, quota resets every run",
            "Set quota.persist_ledger = true to keep usage across runs",
        ));
        return results;
    }

    let ledger_path = settings.ledger_path();
    if ledger_path.exists() {
        let size = std::fs::metadata(&ledger_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "unknown size".to_string());
        results.push(CheckResult::ok(
            "Usage ledger",
            &format!("{} ({})", ledger_path.display(), size),
        ));
    } else {
        results.push(CheckResult::ok(
            "Usage ledger",
            &format!("{} (not created yet)", ledger_path.display()),
        ));
    }

    results
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: tolk config edit",
        )
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_ok() {
        let result = CheckResult::ok("test", "passed");
        assert_eq!(result.status, CheckStatus::Ok);
        assert!(result.hint.is_none());
    }

    #[test]
    fn test_check_result_error() {
        let result = CheckResult::error("test", "failed", "fix it");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijklmnop"), "sk-a...mnop");
        assert_eq!(mask_key("short"), "***");
    }

    #[test]
    fn test_missing_default_key_is_error() {
        let mut settings = Settings::default();
        for service in settings.llm.services.values_mut() {
            service.api_key = None;
            service.api_key_env = "TOLK_TEST_UNSET_KEY".to_string();
        }
        let checks = check_services(&settings);
        assert_eq!(
            checks.iter().filter(|c| c.status == CheckStatus::Error).count(),
            1
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }
}
