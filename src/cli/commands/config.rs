//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::{Context, Result};
use std::path::PathBuf;

const REDACTED: &str = "<redacted>";

/// Run the config command against the `--config` file, or the default one.
pub fn run_config(action: &ConfigAction, settings: &Settings, config: Option<&str>) -> Result<()> {
    let path = config
        .map(PathBuf::from)
        .unwrap_or_else(Settings::default_config_path);

    match action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(&redacted(settings))
                .context("Failed to serialize config")?;
            println!("{}", rendered);
        }
        ConfigAction::Edit => edit(settings, &path)?,
        ConfigAction::Path => println!("{}", path.display()),
    }

    Ok(())
}

/// A copy of `settings` with every inline API key masked.
fn redacted(settings: &Settings) -> Settings {
    let mut copy = settings.clone();
    for service in copy.llm.services.values_mut() {
        if service.api_key.is_some() {
            service.api_key = Some(REDACTED.to_string());
        }
    }
    copy
}

/// Open the config file in `$EDITOR`, then re-read it so a broken edit is
/// reported now rather than on the next run.
fn edit(settings: &Settings, path: &PathBuf) -> Result<()> {
    if !path.exists() {
        settings.save_to(path)?;
        Output::info(&format!("Wrote current settings to {}", path.display()));
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());
    Output::info(&format!("Opening {} in {}...", path.display(), editor));

    let status = std::process::Command::new(&editor)
        .arg(path)
        .status()
        .with_context(|| format!("Failed to launch editor '{}'", editor))?;
    if !status.success() {
        Output::warning("Editor exited with non-zero status.");
        return Ok(());
    }

    match Settings::load_from(Some(path)) {
        Ok(reloaded) => Output::success(&format!(
            "Config is valid ({} service(s), default '{}').",
            reloaded.llm.services.len(),
            reloaded.llm.default_service
        )),
        Err(e) => Output::error(&format!("Config no longer loads: {}", e)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_inline_keys_only() {
        let mut settings = Settings::default();
        let mut names = settings.llm.services.keys().cloned();
        let with_key = names.next().unwrap();
        let without_key = names.next().unwrap();
        settings.llm.services.get_mut(&with_key).unwrap().api_key = Some("sk-live-123".to_string());
        settings.llm.services.get_mut(&without_key).unwrap().api_key = None;

        let shown = redacted(&settings);
        assert_eq!(shown.llm.services[&with_key].api_key.as_deref(), Some(REDACTED));
        assert_eq!(shown.llm.services[&without_key].api_key, None);
        assert_eq!(
            settings.llm.services[&with_key].api_key.as_deref(),
            Some("sk-live-123")
        );
    }

    #[test]
    fn test_rendered_config_has_no_key() {
        let mut settings = Settings::default();
        for service in settings.llm.services.values_mut() {
            service.api_key = Some("sk-live-123".to_string());
        }
        let rendered = toml::to_string_pretty(&redacted(&settings)).unwrap();
        assert!(!rendered.contains("sk-live-123"));
        assert!(rendered.contains(REDACTED));
    }
}
