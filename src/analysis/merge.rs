//! Combining per-chunk results into one.
//!
//! Everything here is deterministic. Summary consolidation needs a model
//! call, so it is reported back as [`SummaryMerge::NeedsConsolidation`] and
//! left to the caller.

use super::{ChunkAnalysisResult, KnowledgeEntry};
use crate::config::AnalysisSettings;
use std::collections::HashSet;

/// Caps and thresholds applied while merging.
#[derive(Debug, Clone)]
pub struct MergeLimits {
    pub max_key_points: usize,
    pub max_categories: usize,
    pub max_tags: usize,
    pub max_knowledge_entries: usize,
    pub min_key_point_chars: usize,
    pub min_knowledge_importance: u8,
    /// When false, knowledge entries are concatenated without filtering.
    pub filter_knowledge: bool,
}

impl From<&AnalysisSettings> for MergeLimits {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            max_key_points: settings.max_key_points,
            max_categories: settings.max_categories,
            max_tags: settings.max_tags,
            max_knowledge_entries: settings.max_knowledge_entries,
            min_key_point_chars: settings.min_key_point_chars,
            min_knowledge_importance: settings.min_knowledge_importance,
            filter_knowledge: settings.enable_knowledge_extraction,
        }
    }
}

impl Default for MergeLimits {
    fn default() -> Self {
        Self::from(&AnalysisSettings::default())
    }
}

/// Outcome of merging chunk summaries.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryMerge {
    /// Zero or one distinct summary; use as is.
    Single(String),
    /// Several distinct summaries, in chunk order.
    NeedsConsolidation(Vec<String>),
}

impl SummaryMerge {
    /// The summary to use when consolidation is skipped or fails: the first
    /// non-empty chunk summary.
    pub fn fallback(&self) -> String {
        match self {
            SummaryMerge::Single(summary) => summary.clone(),
            SummaryMerge::NeedsConsolidation(summaries) => {
                summaries.first().cloned().unwrap_or_default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedAnalysis {
    pub summary: SummaryMerge,
    pub key_points: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub knowledge_entries: Vec<KnowledgeEntry>,
}

/// Merge chunk results in order.
///
/// A single result passes through untouched. For several, the first
/// occurrence wins every deduplication.
pub fn merge_results(results: &[ChunkAnalysisResult], limits: &MergeLimits) -> MergedAnalysis {
    if let [only] = results {
        return MergedAnalysis {
            summary: SummaryMerge::Single(only.summary.clone()),
            key_points: only.key_points.clone(),
            categories: only.categories.clone(),
            tags: only.tags.clone(),
            knowledge_entries: only.knowledge_entries.clone(),
        };
    }

    MergedAnalysis {
        summary: merge_summaries(results),
        key_points: merge_key_points(results, limits),
        categories: union_capped(results.iter().flat_map(|r| &r.categories), limits.max_categories),
        tags: union_capped(results.iter().flat_map(|r| &r.tags), limits.max_tags),
        knowledge_entries: merge_knowledge(results, limits),
    }
}

fn merge_summaries(results: &[ChunkAnalysisResult]) -> SummaryMerge {
    let mut seen = HashSet::new();
    let distinct: Vec<String> = results
        .iter()
        .map(|r| r.summary.trim())
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .map(str::to_string)
        .collect();

    if distinct.len() > 1 {
        SummaryMerge::NeedsConsolidation(distinct)
    } else {
        SummaryMerge::Single(distinct.into_iter().next().unwrap_or_default())
    }
}

fn merge_key_points(results: &[ChunkAnalysisResult], limits: &MergeLimits) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .iter()
        .flat_map(|r| &r.key_points)
        .map(|p| p.trim())
        .filter(|p| p.chars().count() >= limits.min_key_point_chars)
        .filter(|p| seen.insert(p.to_lowercase()))
        .take(limits.max_key_points)
        .map(str::to_string)
        .collect()
}

fn union_capped<'a>(items: impl Iterator<Item = &'a String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .take(cap)
        .map(str::to_string)
        .collect()
}

fn merge_knowledge(results: &[ChunkAnalysisResult], limits: &MergeLimits) -> Vec<KnowledgeEntry> {
    let mut entries: Vec<KnowledgeEntry> = results
        .iter()
        .flat_map(|r| r.knowledge_entries.iter().cloned())
        .collect();

    if !limits.filter_knowledge {
        return entries;
    }

    entries.retain(|e| e.importance >= limits.min_knowledge_importance);
    // Stable, so equal importance keeps chunk order.
    entries.sort_by(|a, b| b.importance.cmp(&a.importance));
    entries.truncate(limits.max_knowledge_entries);
    entries
}
