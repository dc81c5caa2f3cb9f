//! Analysis-specific cache keys and TTLs.

use super::ResultCache;
use crate::analysis::ChunkAnalysisResult;
use crate::config::TaskTtlSettings;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cached analysis sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisTask {
    Analysis,
    Summary,
    KeyPoints,
    Categories,
    Tags,
}

impl AnalysisTask {
    pub const ALL: [AnalysisTask; 5] = [
        AnalysisTask::Analysis,
        AnalysisTask::Summary,
        AnalysisTask::KeyPoints,
        AnalysisTask::Categories,
        AnalysisTask::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisTask::Analysis => "analysis",
            AnalysisTask::Summary => "summary",
            AnalysisTask::KeyPoints => "key_points",
            AnalysisTask::Categories => "categories",
            AnalysisTask::Tags => "tags",
        }
    }
}

impl std::fmt::Display for AnalysisTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view over a [`ResultCache`] keyed by `(content, model, task)`.
///
/// Cache failures never fail the caller: an unreadable or unwritable value
/// is logged and treated as a miss.
#[derive(Clone)]
pub struct AnalysisCache {
    cache: Arc<ResultCache>,
    ttl: TaskTtlSettings,
}

impl AnalysisCache {
    pub fn new(cache: Arc<ResultCache>, ttl: TaskTtlSettings) -> Self {
        Self { cache, ttl }
    }

    /// Deterministic key: task prefix plus a blake3 digest of the inputs.
    pub fn key(content: &str, model: &str, task: AnalysisTask) -> String {
        let digest = blake3::hash(format!("{}:{}:{}", content, model, task).as_bytes());
        format!("{}:{}", task, digest.to_hex())
    }

    fn ttl_for(&self, task: AnalysisTask) -> Duration {
        Duration::from_secs(match task {
            AnalysisTask::Analysis => self.ttl.analysis,
            AnalysisTask::Summary => self.ttl.summary,
            AnalysisTask::KeyPoints => self.ttl.key_points,
            AnalysisTask::Categories => self.ttl.categories,
            AnalysisTask::Tags => self.ttl.tags,
        })
    }

    pub fn get<T: DeserializeOwned>(&self, task: AnalysisTask, content: &str, model: &str) -> Option<T> {
        let key = Self::key(content, model, task);
        match self.cache.get(&key) {
            Ok(Some(value)) => {
                debug!(task = task.as_str(), "Analysis cache hit");
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(task = task.as_str(), error = %e, "Analysis cache read failed");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, task: AnalysisTask, content: &str, model: &str, value: &T) {
        let key = Self::key(content, model, task);
        if let Err(e) = self.cache.set(&key, value, Some(self.ttl_for(task))) {
            warn!(task = task.as_str(), error = %e, "Analysis cache write failed, continuing uncached");
        }
    }

    pub fn get_analysis(&self, content: &str, model: &str) -> Option<ChunkAnalysisResult> {
        self.get(AnalysisTask::Analysis, content, model)
    }

    pub fn set_analysis(&self, content: &str, model: &str, result: &ChunkAnalysisResult) {
        self.set(AnalysisTask::Analysis, content, model, result)
    }

    pub fn get_summary(&self, content: &str, model: &str) -> Option<String> {
        self.get(AnalysisTask::Summary, content, model)
    }

    pub fn set_summary(&self, content: &str, model: &str, summary: &str) {
        self.set(AnalysisTask::Summary, content, model, &summary)
    }

    pub fn get_key_points(&self, content: &str, model: &str) -> Option<Vec<String>> {
        self.get(AnalysisTask::KeyPoints, content, model)
    }

    pub fn set_key_points(&self, content: &str, model: &str, points: &[String]) {
        self.set(AnalysisTask::KeyPoints, content, model, &points)
    }

    pub fn get_categories(&self, content: &str, model: &str) -> Option<Vec<String>> {
        self.get(AnalysisTask::Categories, content, model)
    }

    pub fn set_categories(&self, content: &str, model: &str, categories: &[String]) {
        self.set(AnalysisTask::Categories, content, model, &categories)
    }

    pub fn get_tags(&self, content: &str, model: &str) -> Option<Vec<String>> {
        self.get(AnalysisTask::Tags, content, model)
    }

    pub fn set_tags(&self, content: &str, model: &str, tags: &[String]) {
        self.set(AnalysisTask::Tags, content, model, &tags)
    }

    /// Drop cached results of one task, or of every task.
    pub fn clear(&self, task: Option<AnalysisTask>) -> usize {
        let result = match task {
            Some(t) => self.cache.clear_prefix(&format!("{}:", t)),
            None => AnalysisTask::ALL
                .iter()
                .map(|t| self.cache.clear_prefix(&format!("{}:", t)))
                .sum(),
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Analysis cache clear failed");
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis_cache() -> AnalysisCache {
        let cache = Arc::new(ResultCache::new(100, Duration::from_secs(60), Duration::from_secs(60)));
        AnalysisCache::new(cache, TaskTtlSettings::default())
    }

    #[test]
    fn test_keys_are_deterministic_and_distinct() {
        let a = AnalysisCache::key("text", "openai:gpt-4o-mini", AnalysisTask::Summary);
        let b = AnalysisCache::key("text", "openai:gpt-4o-mini", AnalysisTask::Summary);
        let c = AnalysisCache::key("text", "openai:gpt-4o-mini", AnalysisTask::Tags);
        let d = AnalysisCache::key("text", "glm:glm-4-flash", AnalysisTask::Summary);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.starts_with("summary:"));
    }

    #[test]
    fn test_tasks_are_independent() {
        let cache = analysis_cache();
        cache.set_summary("text", "m", "short summary");
        cache.set_tags("text", "m", &["rust".to_string()]);

        assert_eq!(cache.get_summary("text", "m").as_deref(), Some("short summary"));
        assert_eq!(cache.get_tags("text", "m"), Some(vec!["rust".to_string()]));
        assert_eq!(cache.get_key_points("text", "m"), None);
        assert_eq!(cache.get_summary("text", "other-model"), None);

        cache.set_key_points("text", "m", &["Ownership moves values".to_string()]);
        cache.set_categories("text", "m", &["programming".to_string()]);
        assert_eq!(
            cache.get_key_points("text", "m"),
            Some(vec!["Ownership moves values".to_string()])
        );
        assert_eq!(cache.get_categories("text", "m"), Some(vec!["programming".to_string()]));
    }

    #[test]
    fn test_analysis_round_trip() {
        let cache = analysis_cache();
        let result = ChunkAnalysisResult {
            summary: "s".to_string(),
            key_points: vec!["point".to_string()],
            tokens_used: 12,
            ..ChunkAnalysisResult::default()
        };
        cache.set_analysis("chunk", "m", &result);
        assert_eq!(cache.get_analysis("chunk", "m"), Some(result));
    }

    #[test]
    fn test_clear_by_task() {
        let cache = analysis_cache();
        cache.set_summary("a", "m", "x");
        cache.set_summary("b", "m", "y");
        cache.set_tags("a", "m", &[]);

        assert_eq!(cache.clear(Some(AnalysisTask::Summary)), 2);
        assert_eq!(cache.get_summary("a", "m"), None);
        assert_eq!(cache.get_tags("a", "m"), Some(vec![]));
        assert_eq!(cache.clear(None), 1);
    }
}
