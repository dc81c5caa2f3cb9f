//! Analysis result types, response parsing and merging.

mod merge;
mod parse;

pub use merge::{merge_results, MergeLimits, MergedAnalysis, SummaryMerge};
pub use parse::{parse_heuristic, parse_list, parse_response, parse_structured};

use serde::{Deserialize, Deserializer, Serialize};

/// A ranked fact or concept extracted from content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// concept, fact, method, tip
    #[serde(rename = "type", default = "default_entry_type")]
    pub entry_type: String,
    /// 1 (trivial) to 5 (essential).
    #[serde(default = "default_importance", deserialize_with = "lenient_importance")]
    pub importance: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_entry_type() -> String {
    "concept".to_string()
}

fn default_importance() -> u8 {
    1
}

/// Accepts integers, floats and numeric strings; clamps to 1..=5.
fn lenient_importance<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(1.0, 5.0) as u8)
        .unwrap_or_else(default_importance))
}

/// Analysis of a single chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkAnalysisResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub knowledge_entries: Vec<KnowledgeEntry>,
    pub tokens_used: u64,
    pub cost: f64,
}

/// Merged analysis of a whole transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedAnalysisResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub knowledge_entries: Vec<KnowledgeEntry>,
    /// Tokens spent by provider calls made for this analysis.
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Wall-clock seconds from preprocessing to merge completion.
    pub analysis_time: f64,
    pub model_used: String,
    pub chunk_count: usize,
}
