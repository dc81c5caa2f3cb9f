//! Pipeline orchestrator for Tolk.
//!
//! Coordinates the whole analysis from raw transcript to aggregated result:
//! preprocess, chunk, analyze each chunk (cache-checked and quota-gated),
//! then merge.

use crate::analysis::{
    merge_results, parse_list, parse_response, AggregatedAnalysisResult, ChunkAnalysisResult,
    MergeLimits, SummaryMerge,
};
use crate::cache::{AnalysisCache, AnalysisTask, ResultCache};
use crate::chunking::{ChunkConfig, ChunkEngine, TextChunk};
use crate::config::{PromptPair, Prompts, Settings};
use crate::error::{Result, TolkError};
use crate::llm::{ChatMessage, ChatResponse, LlmManager, LlmProvider};
use crate::preprocess::{SubtitleFormat, TextPreprocessor};
use crate::quota::QuotaGovernor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Ledger task type of a per-chunk analysis call.
pub const TASK_CHUNK_ANALYSIS: &str = "chunk_analysis";
/// Ledger task type of the summary consolidation call.
pub const TASK_SUMMARY_MERGE: &str = "summary_merge";

/// The main orchestrator for the Tolk pipeline.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    preprocessor: TextPreprocessor,
    chunker: ChunkEngine,
    llm: Arc<LlmManager>,
    cache: Arc<AnalysisCache>,
    quota: Arc<QuotaGovernor>,
}

impl Orchestrator {
    /// Create a new orchestrator from configuration.
    ///
    /// Builds every configured LLM service that has a key, an in-memory
    /// result cache and the quota governor (with its ledger when
    /// `quota.persist_ledger` is set).
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let llm = Arc::new(LlmManager::from_settings(&settings.llm)?);

        let cache = Arc::new(AnalysisCache::new(
            Arc::new(ResultCache::from_settings(&settings.cache)),
            settings.cache.ttl.clone(),
        ));

        let mut quota = QuotaGovernor::new(&settings.quota);
        if settings.quota.persist_ledger {
            std::fs::create_dir_all(settings.data_dir())?;
            quota = quota.with_ledger(settings.ledger_path())?;
        }

        Ok(Self::with_components(settings, prompts, llm, cache, Arc::new(quota)))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        llm: Arc<LlmManager>,
        cache: Arc<AnalysisCache>,
        quota: Arc<QuotaGovernor>,
    ) -> Self {
        Self {
            settings,
            prompts,
            preprocessor: TextPreprocessor::new(),
            chunker: ChunkEngine::default(),
            llm,
            cache,
            quota,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn llm(&self) -> Arc<LlmManager> {
        self.llm.clone()
    }

    pub fn cache(&self) -> Arc<AnalysisCache> {
        self.cache.clone()
    }

    pub fn quota(&self) -> Arc<QuotaGovernor> {
        self.quota.clone()
    }

    /// Analyze a transcript and merge the per-chunk results.
    ///
    /// Chunks are analyzed one after another. A quota refusal or an
    /// exhausted provider call aborts the whole analysis; unparseable
    /// responses and a failed summary consolidation only degrade it.
    #[instrument(skip(self, text), fields(format = %format, chars = text.len()))]
    pub async fn analyze(
        &self,
        text: &str,
        format: SubtitleFormat,
        service: Option<&str>,
    ) -> Result<AggregatedAnalysisResult> {
        let started = Instant::now();
        let (service_name, provider) = self.resolve(service)?;

        info!("Preprocessing transcript...");
        let cleaned = self.preprocessor.preprocess(text, format);
        if cleaned.trim().is_empty() {
            return Err(TolkError::InvalidInput(
                "Transcript is empty after preprocessing".to_string(),
            ));
        }

        let chunks = self.chunk(&cleaned);
        info!(
            "Analyzing {} chunks with {} ({})",
            chunks.len(),
            service_name,
            provider.model()
        );

        let cache_model = format!("{}:{}", service_name, provider.model());
        let caching = self.settings.analysis.enable_caching;
        let mut results: Vec<ChunkAnalysisResult> = Vec::with_capacity(chunks.len());
        let mut total_tokens = 0u64;
        let mut total_cost = 0.0f64;

        for (index, chunk) in chunks.iter().enumerate() {
            if caching {
                if let Some(cached) = self.cache.get_analysis(&chunk.content, &cache_model) {
                    debug!(chunk = index, "Using cached chunk analysis");
                    results.push(cached);
                    continue;
                }
            }

            let messages = self.messages(&self.prompts.analysis, "content", &chunk.content);
            let response = self
                .call(provider.as_ref(), &messages, TASK_CHUNK_ANALYSIS, &chunk.content)
                .await?;

            let mut result = parse_response(&response.content);
            result.tokens_used = response.tokens_used;
            result.cost = response.cost;
            total_tokens += response.tokens_used;
            total_cost += response.cost;

            debug!(
                chunk = index,
                tokens = response.tokens_used,
                key_points = result.key_points.len(),
                "Analyzed chunk"
            );

            if caching {
                self.cache.set_analysis(&chunk.content, &cache_model, &result);
            }
            results.push(result);
        }

        let merged = merge_results(&results, &MergeLimits::from(&self.settings.analysis));
        let fallback = merged.summary.fallback();
        let summary = match merged.summary {
            SummaryMerge::Single(summary) => summary,
            SummaryMerge::NeedsConsolidation(summaries) => {
                info!("Consolidating {} chunk summaries", summaries.len());
                match self.consolidate(provider.as_ref(), &summaries).await {
                    Ok(response) => {
                        total_tokens += response.tokens_used;
                        total_cost += response.cost;
                        let consolidated = response.content.trim();
                        if consolidated.is_empty() {
                            warn!("Summary consolidation returned nothing, using first summary");
                            fallback
                        } else {
                            consolidated.to_string()
                        }
                    }
                    Err(e) => {
                        warn!("Summary consolidation failed, using first summary: {}", e);
                        fallback
                    }
                }
            }
        };

        let analysis_time = started.elapsed().as_secs_f64();
        info!(
            chunks = chunks.len(),
            total_tokens,
            total_cost,
            analysis_time,
            "Analysis complete"
        );

        Ok(AggregatedAnalysisResult {
            summary,
            key_points: merged.key_points,
            categories: merged.categories,
            tags: merged.tags,
            knowledge_entries: merged.knowledge_entries,
            total_tokens,
            total_cost,
            analysis_time,
            model_used: provider.model().to_string(),
            chunk_count: chunks.len(),
        })
    }

    /// Preprocessed text split into chunks, honoring the chunking settings.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if !self.settings.analysis.enable_chunking {
            return vec![TextChunk {
                content: text.to_string(),
                start_index: 0,
                end_index: text.chars().count(),
                metadata: HashMap::from([("strategy".to_string(), "whole".to_string())]),
            }];
        }

        let config = ChunkConfig::from(&self.settings.chunking);
        let chunks = self.chunker.chunk(text, &config);
        if self.settings.chunking.optimize {
            self.chunker.optimize(chunks, config.min_tokens)
        } else {
            chunks
        }
    }

    /// Short summary of `text`.
    pub async fn summarize(&self, text: &str, service: Option<&str>) -> Result<String> {
        let prompt = self.prompts.tasks.summary.clone();
        self.run_task(AnalysisTask::Summary, &prompt, text, service, |response| {
            response.trim().to_string()
        })
        .await
    }

    pub async fn extract_key_points(&self, text: &str, service: Option<&str>) -> Result<Vec<String>> {
        let prompt = self.prompts.tasks.key_points.clone();
        let cap = self.settings.analysis.max_key_points;
        self.run_task(AnalysisTask::KeyPoints, &prompt, text, service, |response| {
            capped(parse_list(response, "key_points"), cap)
        })
        .await
    }

    pub async fn categorize(&self, text: &str, service: Option<&str>) -> Result<Vec<String>> {
        let prompt = self.prompts.tasks.categories.clone();
        let cap = self.settings.analysis.max_categories;
        self.run_task(AnalysisTask::Categories, &prompt, text, service, |response| {
            capped(parse_list(response, "categories"), cap)
        })
        .await
    }

    pub async fn generate_tags(&self, text: &str, service: Option<&str>) -> Result<Vec<String>> {
        let prompt = self.prompts.tasks.tags.clone();
        let cap = self.settings.analysis.max_tags;
        self.run_task(AnalysisTask::Tags, &prompt, text, service, |response| {
            capped(parse_list(response, "tags"), cap)
        })
        .await
    }

    /// Cache-checked, quota-gated single prompt whose parsed output is cached
    /// under `task`.
    async fn run_task<T, F>(
        &self,
        task: AnalysisTask,
        prompt: &PromptPair,
        text: &str,
        service: Option<&str>,
        parse: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&str) -> T,
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(TolkError::InvalidInput("Text is empty".to_string()));
        }

        let (service_name, provider) = self.resolve(service)?;
        let cache_model = format!("{}:{}", service_name, provider.model());
        let caching = self.settings.analysis.enable_caching;

        if caching {
            if let Some(cached) = self.cache.get(task, text, &cache_model) {
                return Ok(cached);
            }
        }

        let messages = self.messages(prompt, "content", text);
        let response = self
            .call(provider.as_ref(), &messages, task.as_str(), text)
            .await?;
        let value = parse(&response.content);

        if caching {
            self.cache.set(task, text, &cache_model, &value);
        }
        Ok(value)
    }

    async fn consolidate(
        &self,
        provider: &dyn LlmProvider,
        summaries: &[String],
    ) -> Result<ChatResponse> {
        let listing = numbered(summaries);
        let messages = [
            ChatMessage::system(self.prompts.merge.system.clone()),
            ChatMessage::user(self.render(&self.prompts.merge.user, "summaries", &listing)),
        ];
        self.call(provider, &messages, TASK_SUMMARY_MERGE, &listing)
            .await
    }

    /// Gate on every enforced quota window, call the provider with retries,
    /// then record the spend.
    async fn call(
        &self,
        provider: &dyn LlmProvider,
        messages: &[ChatMessage],
        task_type: &str,
        content: &str,
    ) -> Result<ChatResponse> {
        let prompt_tokens: u64 = messages.iter().map(|m| provider.count_tokens(&m.content)).sum();
        // Room for a response about as long as the prompt.
        let estimated_tokens = prompt_tokens * 2;
        let estimated_cost = provider.estimate_cost(estimated_tokens);

        for window in &self.settings.quota.enforced_windows {
            self.quota.enforce(estimated_tokens, estimated_cost, *window)?;
        }

        let response = self.llm.chat_with(provider, messages).await?;
        self.quota.record_usage(
            response.tokens_used,
            response.cost,
            provider.model(),
            task_type,
            content,
        )?;
        Ok(response)
    }

    fn resolve(&self, service: Option<&str>) -> Result<(String, Arc<dyn LlmProvider>)> {
        if self.llm.services().is_empty() {
            return Err(TolkError::Config(
                "No LLM services available. Set an API key for at least one service (see `tolk doctor`)".to_string(),
            ));
        }
        self.llm.get(service)
    }

    fn messages(&self, prompt: &PromptPair, var: &str, value: &str) -> [ChatMessage; 2] {
        [
            ChatMessage::system(prompt.system.clone()),
            ChatMessage::user(self.render(&prompt.user, var, value)),
        ]
    }

    fn render(&self, template: &str, var: &str, value: &str) -> String {
        let vars = HashMap::from([(var.to_string(), value.to_string())]);
        self.prompts.render_with_custom(template, &vars)
    }
}

fn capped(mut items: Vec<String>, cap: usize) -> Vec<String> {
    items.truncate(cap);
    items
}

fn numbered(summaries: &[String]) -> String {
    summaries
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}
