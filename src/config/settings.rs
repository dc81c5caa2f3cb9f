//! Configuration settings for Tolk.

use crate::llm::ProviderKind;
use crate::quota::WindowType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub llm: LlmSettings,
    pub chunking: ChunkingSettings,
    pub analysis: AnalysisSettings,
    pub cache: CacheSettings,
    pub quota: QuotaSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data (usage ledger).
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.tolk".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// LLM gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Service used when a request names none.
    pub default_service: String,
    /// Retry policy applied to every chat call.
    pub retry: RetrySettings,
    /// Named services, keyed by service name.
    pub services: BTreeMap<String, ServiceSettings>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            "openai".to_string(),
            ServiceSettings {
                kind: ProviderKind::OpenAi,
                api_key: None,
                api_key_env: "OPENAI_API_KEY".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                max_tokens: 4000,
                temperature: 0.7,
                timeout_secs: 30,
            },
        );
        services.insert(
            "anthropic".to_string(),
            ServiceSettings {
                kind: ProviderKind::Anthropic,
                api_key: None,
                api_key_env: "ANTHROPIC_API_KEY".to_string(),
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-3-haiku-20240307".to_string(),
                max_tokens: 4000,
                temperature: 0.7,
                timeout_secs: 30,
            },
        );
        services.insert(
            "glm".to_string(),
            ServiceSettings {
                kind: ProviderKind::OpenAi,
                api_key: None,
                api_key_env: "GLM_API_KEY".to_string(),
                base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
                model: "glm-4-flash".to_string(),
                max_tokens: 4000,
                temperature: 0.7,
                timeout_secs: 30,
            },
        );

        Self {
            default_service: "openai".to_string(),
            retry: RetrySettings::default(),
            services,
        }
    }
}

/// Retry policy for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 4000,
            max_delay_ms: 10_000,
        }
    }
}

/// Settings for a single LLM service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Wire protocol family.
    pub kind: ProviderKind,
    /// API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// API base URL.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Maximum completion tokens per request.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

impl ServiceSettings {
    /// Resolve the API key from the config value or the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
    }
}

/// Text chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Upper token bound per chunk.
    pub max_tokens: usize,
    /// Lower token bound used by boundary snapping and the optimize pass.
    pub min_tokens: usize,
    /// Tokens of trailing context carried into the next chunk.
    pub overlap_tokens: usize,
    /// Snap fixed-size cuts back to sentence ends.
    pub respect_sentence_boundaries: bool,
    /// Sentence-accumulating chunking instead of fixed-size windows.
    pub semantic_chunking: bool,
    /// Merge undersized chunks into their predecessor after chunking.
    pub optimize: bool,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            min_tokens: 100,
            overlap_tokens: 200,
            respect_sentence_boundaries: true,
            semantic_chunking: true,
            optimize: false,
        }
    }
}

/// Analysis and merge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Split long transcripts into chunks before analysis.
    pub enable_chunking: bool,
    /// Reuse cached chunk results.
    pub enable_caching: bool,
    /// Filter and rank knowledge entries when merging.
    pub enable_knowledge_extraction: bool,
    pub max_key_points: usize,
    pub max_categories: usize,
    pub max_tags: usize,
    pub max_knowledge_entries: usize,
    /// Merged key points shorter than this many characters are discarded.
    pub min_key_point_chars: usize,
    /// Merged knowledge entries below this importance are discarded.
    pub min_knowledge_importance: u8,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enable_chunking: true,
            enable_caching: true,
            enable_knowledge_extraction: true,
            max_key_points: 10,
            max_categories: 5,
            max_tags: 15,
            max_knowledge_entries: 20,
            min_key_point_chars: 10,
            min_knowledge_importance: 3,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of entries before LRU eviction.
    pub max_size: usize,
    /// TTL for entries stored without an explicit TTL.
    pub default_ttl_secs: u64,
    /// Minimum interval between opportunistic expiry sweeps.
    pub cleanup_interval_secs: u64,
    /// Per-task TTLs for analysis results.
    pub ttl: TaskTtlSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_secs: 3600,
            cleanup_interval_secs: 300,
            ttl: TaskTtlSettings::default(),
        }
    }
}

/// TTLs for the analysis cache tasks, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskTtlSettings {
    pub analysis: u64,
    pub summary: u64,
    pub key_points: u64,
    pub categories: u64,
    pub tags: u64,
}

impl Default for TaskTtlSettings {
    fn default() -> Self {
        Self {
            analysis: 3600,
            summary: 3600,
            key_points: 3600,
            categories: 3600,
            tags: 3600,
        }
    }
}

/// Token and cost ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub daily_token_limit: u64,
    pub daily_cost_limit: f64,
    pub weekly_token_limit: u64,
    pub weekly_cost_limit: f64,
    pub monthly_token_limit: u64,
    pub monthly_cost_limit: f64,
    /// Windows checked before every provider call.
    pub enforced_windows: Vec<WindowType>,
    /// Usage ratio at which a warning is logged.
    pub alert_threshold: f64,
    /// Persist the usage ledger in the data directory.
    pub persist_ledger: bool,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            daily_token_limit: 100_000,
            daily_cost_limit: 10.0,
            weekly_token_limit: 500_000,
            weekly_cost_limit: 50.0,
            monthly_token_limit: 2_000_000,
            monthly_cost_limit: 200.0,
            enforced_windows: vec![WindowType::Daily],
            alert_threshold: 0.8,
            persist_ledger: true,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TolkError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tolk")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Path of the persisted usage ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir().join("usage.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [chunking]
            max_tokens = 500

            [quota]
            daily_token_limit = 1000
            enforced_windows = ["daily", "weekly"]

            [llm.services.local]
            kind = "openai"
            base_url = "http://localhost:11434/v1"
            model = "qwen2.5"
            "#,
        )
        .unwrap();

        assert_eq!(settings.chunking.max_tokens, 500);
        assert_eq!(settings.chunking.min_tokens, 100);
        assert_eq!(settings.quota.daily_token_limit, 1000);
        assert_eq!(settings.quota.daily_cost_limit, 10.0);
        assert_eq!(
            settings.quota.enforced_windows,
            vec![WindowType::Daily, WindowType::Weekly]
        );

        let local = &settings.llm.services["local"];
        assert_eq!(local.model, "qwen2.5");
        assert_eq!(local.timeout_secs, 30);
        assert_eq!(settings.llm.retry.max_attempts, 3);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.analysis.max_tags = 7;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.analysis.max_tags, 7);
        assert_eq!(loaded.llm.services.len(), 3);
    }

    #[test]
    fn test_resolve_api_key_prefers_literal() {
        let service = ServiceSettings {
            api_key: Some("sk-literal".to_string()),
            api_key_env: "TOLK_TEST_UNSET_KEY_VAR".to_string(),
            ..ServiceSettings::default()
        };
        assert_eq!(service.resolve_api_key().as_deref(), Some("sk-literal"));

        let missing = ServiceSettings {
            api_key: None,
            api_key_env: "TOLK_TEST_UNSET_KEY_VAR".to_string(),
            ..ServiceSettings::default()
        };
        assert_eq!(missing.resolve_api_key(), None);
    }
}
