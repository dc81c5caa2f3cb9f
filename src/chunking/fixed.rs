//! Fixed-window chunking.
//!
//! Walks the text in windows of roughly `max_tokens * 3` characters,
//! optionally pulling each cut back to the nearest sentence end.

use super::semantic::TERMINALS;
use super::{ChunkConfig, TextChunk, TokenCounter};

/// Approximate characters per token used to size windows.
pub(super) const CHARS_PER_TOKEN: usize = 3;

/// How far back a cut may move to land on a sentence end.
const LOOKBACK_CHARS: usize = 500;

pub(super) fn fixed_chunks(
    chars: &[char],
    counter: &dyn TokenCounter,
    config: &ChunkConfig,
) -> Vec<TextChunk> {
    let step = (config.max_tokens * CHARS_PER_TOKEN).max(1);
    let min_chars = config.min_tokens * CHARS_PER_TOKEN;
    let mut chunks = Vec::new();
    let mut cursor = 0;

    while cursor < chars.len() {
        let rest: String = chars[cursor..].iter().collect();
        if counter.count(&rest) <= config.max_tokens {
            chunks.push(TextChunk::from_span(chars, cursor, chars.len(), "fixed"));
            break;
        }

        let mut end = (cursor + step).min(chars.len());
        if config.respect_sentence_boundaries && end < chars.len() {
            if let Some(cut) = sentence_end_before(chars, cursor, end) {
                if cut > cursor + min_chars {
                    end = cut;
                }
            }
        }

        chunks.push(TextChunk::from_span(chars, cursor, end, "fixed"));
        cursor = end;
    }

    chunks
}

/// Offset just past the last sentence terminator in the look-back window
/// ending at `end`.
fn sentence_end_before(chars: &[char], cursor: usize, end: usize) -> Option<usize> {
    let floor = end.saturating_sub(LOOKBACK_CHARS).max(cursor);
    (floor..end)
        .rev()
        .find(|&i| chars[i] == '\n' || chars[i] == '.' || TERMINALS.contains(&chars[i]))
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_end_before_respects_floor() {
        let chars: Vec<char> = "abc. defgh".chars().collect();
        assert_eq!(sentence_end_before(&chars, 0, 9), Some(4));
        assert_eq!(sentence_end_before(&chars, 5, 9), None);
    }
}
