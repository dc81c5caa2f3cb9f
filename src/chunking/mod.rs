//! Token-bounded text chunking.
//!
//! Splits cleaned transcripts into [`TextChunk`]s that fit a model's
//! context budget. Two strategies are available: sentence accumulation
//! (default) and fixed character windows. Both report char offsets into
//! the input and, without overlap, tile it exactly.

mod fixed;
mod semantic;
mod tokens;

#[cfg(feature = "hf-tokenizer")]
pub use tokens::HfTokenCounter;
pub use tokens::{HeuristicCounter, TokenCounter};

use crate::config::ChunkingSettings;
use fixed::CHARS_PER_TOKEN;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A contiguous slice of the chunked text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Text of this chunk, including any overlap prefix.
    pub content: String,
    /// Char offset of the first character (inclusive).
    pub start_index: usize,
    /// Char offset past the last character (exclusive).
    pub end_index: usize,
    /// Free-form annotations (`strategy`, `split`, `overlap_chars`).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl TextChunk {
    fn from_span(chars: &[char], start: usize, end: usize, strategy: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("strategy".to_string(), strategy.to_string());
        Self {
            content: chars[start..end].iter().collect(),
            start_index: start,
            end_index: end,
            metadata,
        }
    }

    /// Number of leading characters copied from the previous chunk.
    pub fn overlap_chars(&self) -> usize {
        self.metadata
            .get("overlap_chars")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Content without the overlap prefix.
    pub fn own_content(&self) -> String {
        self.content.chars().skip(self.overlap_chars()).collect()
    }
}

/// Chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub max_tokens: usize,
    pub min_tokens: usize,
    pub overlap_tokens: usize,
    pub respect_sentence_boundaries: bool,
    pub semantic_chunking: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::from(&ChunkingSettings::default())
    }
}

impl From<&ChunkingSettings> for ChunkConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            min_tokens: settings.min_tokens,
            overlap_tokens: settings.overlap_tokens,
            respect_sentence_boundaries: settings.respect_sentence_boundaries,
            semantic_chunking: settings.semantic_chunking,
        }
    }
}

/// Splits text into token-bounded chunks.
#[derive(Clone)]
pub struct ChunkEngine {
    counter: Arc<dyn TokenCounter>,
}

impl Default for ChunkEngine {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicCounter::default()))
    }
}

impl ChunkEngine {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    /// Token count of `text` under this engine's counter.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Split `text` into ordered chunks. Never fails; empty text gives no chunks.
    #[instrument(skip(self, text, config), fields(max_tokens = config.max_tokens, semantic = config.semantic_chunking))]
    pub fn chunk(&self, text: &str, config: &ChunkConfig) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut chunks = if config.semantic_chunking {
            semantic::semantic_chunks(&chars, self.counter.as_ref(), config)
        } else {
            fixed::fixed_chunks(&chars, self.counter.as_ref(), config)
        };

        if config.overlap_tokens > 0 {
            apply_overlap(&chars, &mut chunks, config.overlap_tokens);
        }

        info!(
            "Split {} chars into {} chunks using {} token counts",
            chars.len(),
            chunks.len(),
            self.counter.name()
        );
        chunks
    }

    /// Merge chunks below `min_tokens` into their predecessor.
    ///
    /// An undersized first chunk has no predecessor and is dropped, unless
    /// that would leave nothing at all.
    pub fn optimize(&self, chunks: Vec<TextChunk>, min_tokens: usize) -> Vec<TextChunk> {
        let before = chunks.len();
        let mut out: Vec<TextChunk> = Vec::with_capacity(before);
        let mut dropped_first = None;

        for chunk in chunks {
            if self.counter.count(&chunk.content) >= min_tokens {
                out.push(chunk);
                continue;
            }

            match out.last_mut() {
                Some(last) => {
                    let shared = last.end_index.saturating_sub(chunk.start_index);
                    last.content.extend(chunk.content.chars().skip(shared));
                    last.end_index = chunk.end_index;
                }
                None if dropped_first.is_none() => dropped_first = Some(chunk),
                None => {}
            }
        }

        if out.is_empty() {
            if let Some(first) = dropped_first {
                out.push(first);
            }
        }

        debug!("Optimized {} chunks into {}", before, out.len());
        out
    }
}

/// Prefix every chunk but the first with the tail of its predecessor.
fn apply_overlap(chars: &[char], chunks: &mut [TextChunk], overlap_tokens: usize) {
    let want = overlap_tokens * CHARS_PER_TOKEN;

    for i in (1..chunks.len()).rev() {
        let prev = &chunks[i - 1];
        let take = want.min(prev.end_index - prev.start_index);
        let start = chunks[i].start_index - take;

        let chunk = &mut chunks[i];
        chunk.content = chars[start..chunk.end_index].iter().collect();
        chunk.start_index = start;
        chunk
            .metadata
            .insert("overlap_chars".to_string(), take.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_tokens: usize, overlap_tokens: usize) -> ChunkConfig {
        ChunkConfig {
            max_tokens,
            min_tokens: 1,
            overlap_tokens,
            respect_sentence_boundaries: true,
            semantic_chunking: true,
        }
    }

    fn transcript() -> String {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("Sentence number {} talks about ownership and borrowing. ", i));
            text.push_str("所有权规则决定了内存何时释放。\n");
        }
        text
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(ChunkEngine::default().chunk("", &config(100, 0)).is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = ChunkEngine::default().chunk("Hello world.", &config(100, 20));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello world.");
        assert_eq!((chunks[0].start_index, chunks[0].end_index), (0, 12));
    }

    #[test]
    fn test_semantic_chunks_respect_budget_and_tile() {
        let engine = ChunkEngine::default();
        let text = transcript();
        let chunks = engine.chunk(&text, &config(120, 0));

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(engine.count_tokens(&chunk.content) <= 120);
            assert!(chunk.start_index < chunk.end_index);
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_index, pair[1].start_index);
        }
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_fixed_chunks_tile_and_snap_to_sentences() {
        let engine = ChunkEngine::default();
        let text = transcript();
        let cfg = ChunkConfig {
            semantic_chunking: false,
            ..config(60, 0)
        };
        let chunks = engine.chunk(&text, &cfg);

        assert!(chunks.len() > 1);
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, text);
        for chunk in &chunks[..chunks.len() - 1] {
            let last = chunk.content.chars().last().unwrap();
            assert!(last == '\n' || last == '.' || last == '。', "cut at {last:?}");
        }
    }

    #[test]
    fn test_long_cjk_text_is_force_split() {
        let engine = ChunkEngine::default();
        let text = "测".repeat(2000);
        let chunks = engine.chunk(&text, &config(100, 0));

        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| c.metadata.get("split").map(String::as_str) == Some("forced")));
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_cjk_sentences_pack_into_several_chunks() {
        let engine = ChunkEngine::default();
        let text = "这是一个关于所有权的句子。".repeat(160);
        assert_eq!(text.chars().count(), 2080);

        let chunks = engine.chunk(&text, &config(100, 0));
        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| engine.count_tokens(&c.content) <= 100));
    }

    #[test]
    fn test_overlap_prefixes_previous_tail() {
        let engine = ChunkEngine::default();
        let text = transcript();
        let plain = engine.chunk(&text, &config(120, 0));
        let overlapped = engine.chunk(&text, &config(120, 5));

        assert_eq!(plain.len(), overlapped.len());
        assert_eq!(overlapped[0], plain[0]);
        for (i, chunk) in overlapped.iter().enumerate().skip(1) {
            assert_eq!(chunk.overlap_chars(), 15);
            assert_eq!(chunk.start_index, plain[i].start_index - 15);
            assert_eq!(chunk.end_index, plain[i].end_index);
            assert_eq!(chunk.own_content(), plain[i].content);

            let prev_tail: String = plain[i - 1]
                .content
                .chars()
                .rev()
                .take(15)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            assert!(chunk.content.starts_with(&prev_tail));
        }
    }

    #[test]
    fn test_optimize_merges_small_chunks() {
        let engine = ChunkEngine::default();
        let text = "Rust ownership rules explained in full detail. ok. Borrowing rules are explained in full detail.";
        let chunks = engine.chunk(text, &config(10, 0));
        assert_eq!(chunks.len(), 3);

        let optimized = engine.optimize(chunks, 3);
        assert_eq!(optimized.len(), 2);
        assert!(optimized[0].content.ends_with("ok. "));
        assert_eq!(optimized[0].end_index, optimized[1].start_index);
    }

    #[test]
    fn test_optimize_never_empties_non_empty_input() {
        let engine = ChunkEngine::default();
        let chunks = engine.chunk("hi.", &config(10, 0));
        let optimized = engine.optimize(chunks, 50);
        assert_eq!(optimized.len(), 1);
        assert_eq!(optimized[0].content, "hi.");
    }
}
