//! Configuration module for Tolk.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{MergePrompts, PromptPair, Prompts, TaskPrompts};
pub use settings::{
    AnalysisSettings, CacheSettings, ChunkingSettings, GeneralSettings, LlmSettings,
    PromptSettings, QuotaSettings, RetrySettings, ServiceSettings, Settings, TaskTtlSettings,
};
