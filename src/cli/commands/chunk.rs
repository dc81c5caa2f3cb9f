//! Chunk command implementation.

use super::read_input;
use crate::chunking::{ChunkConfig, ChunkEngine};
use crate::cli::Output;
use crate::config::Settings;
use crate::preprocess::{text_stats, TextPreprocessor};
use anyhow::Result;

/// Run the chunk command: preprocess and chunk without calling any model.
pub fn run_chunk(
    input: &str,
    format: &str,
    max_tokens: Option<usize>,
    overlap_tokens: Option<usize>,
    fixed: bool,
    settings: &Settings,
) -> Result<()> {
    let (text, format) = read_input(input, format)?;

    let cleaned = TextPreprocessor::new().preprocess(&text, format);
    let stats = text_stats(&cleaned);

    let mut config = ChunkConfig::from(&settings.chunking);
    if let Some(max) = max_tokens {
        config.max_tokens = max;
    }
    if let Some(overlap) = overlap_tokens {
        config.overlap_tokens = overlap;
    }
    if fixed {
        config.semantic_chunking = false;
    }

    let engine = ChunkEngine::default();
    let mut chunks = engine.chunk(&cleaned, &config);
    if settings.chunking.optimize {
        chunks = engine.optimize(chunks, config.min_tokens);
    }

    Output::header("Preprocessed");
    Output::kv("Format", &format.to_string());
    Output::kv("Characters", &stats.total_chars.to_string());
    Output::kv("Words", &stats.total_words.to_string());
    Output::kv("Sentences", &stats.total_sentences.to_string());
    Output::kv("CJK ratio", &format!("{:.2}", stats.cjk_ratio));
    Output::kv("Tokens", &engine.count_tokens(&cleaned).to_string());

    if chunks.is_empty() {
        Output::warning("Nothing left to chunk after preprocessing.");
        return Ok(());
    }

    Output::header(&format!("Chunks ({})", chunks.len()));
    for (i, chunk) in chunks.iter().enumerate() {
        Output::chunk(i, chunk, engine.count_tokens(&chunk.content));
    }

    Ok(())
}
