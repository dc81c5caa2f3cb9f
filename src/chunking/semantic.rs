//! Sentence-accumulating chunking.
//!
//! Splits text into sentence spans and packs whole sentences into chunks
//! until the token budget is reached.

use super::{ChunkConfig, TextChunk, TokenCounter};
use tracing::debug;

/// Characters that end a sentence on their own.
pub(super) const TERMINALS: &[char] = &['。', '！', '？', '!', '?', '…'];
const CLOSING_MARKS: &[char] = &['"', '\'', '”', '’', '」', '』', ')', '）'];

fn is_break(chars: &[char], i: usize) -> bool {
    match chars[i] {
        '\n' => true,
        '.' => chars.get(i + 1).map_or(true, |c| c.is_whitespace()),
        c => TERMINALS.contains(&c),
    }
}

/// Split text into sentence spans `[start, end)` over char offsets.
///
/// Spans tile the input exactly: terminal punctuation, closing quotes and
/// the whitespace after a sentence all belong to that sentence.
pub(super) fn sentence_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if !is_break(chars, i) {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < chars.len() && (TERMINALS.contains(&chars[end]) || chars[end] == '.') {
            end += 1;
        }
        while end < chars.len() && CLOSING_MARKS.contains(&chars[end]) {
            end += 1;
        }
        while end < chars.len() && chars[end].is_whitespace() {
            end += 1;
        }

        spans.push((start, end));
        start = end;
        i = end;
    }

    if start < chars.len() {
        spans.push((start, chars.len()));
    }

    spans
}

/// Pack sentences into chunks of at most `config.max_tokens` tokens.
///
/// A sentence that alone exceeds the budget is cut into proportional
/// character slices, each emitted as its own chunk.
pub(super) fn semantic_chunks(
    chars: &[char],
    counter: &dyn TokenCounter,
    config: &ChunkConfig,
) -> Vec<TextChunk> {
    let max_tokens = config.max_tokens.max(1);
    let mut chunks = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut current_tokens = 0;

    for (start, end) in sentence_spans(chars) {
        let sentence: String = chars[start..end].iter().collect();
        let tokens = counter.count(&sentence);

        if tokens > max_tokens {
            if let Some((s, e)) = current.take() {
                chunks.push(TextChunk::from_span(chars, s, e, "semantic"));
                current_tokens = 0;
            }
            chunks.extend(force_split(chars, start, end, tokens, max_tokens));
            continue;
        }

        if let Some((s, e)) = current {
            if current_tokens + tokens > max_tokens {
                chunks.push(TextChunk::from_span(chars, s, e, "semantic"));
                current = None;
                current_tokens = 0;
            }
        }

        current = Some(match current {
            Some((s, _)) => (s, end),
            None => (start, end),
        });
        current_tokens += tokens;
    }

    if let Some((s, e)) = current {
        chunks.push(TextChunk::from_span(chars, s, e, "semantic"));
    }

    chunks
}

fn force_split(
    chars: &[char],
    start: usize,
    end: usize,
    tokens: usize,
    max_tokens: usize,
) -> Vec<TextChunk> {
    let len = end - start;
    let target_chars = (len * max_tokens / tokens).max(1);
    debug!(
        "Force-splitting sentence of {} chars ({} tokens) into {}-char slices",
        len, tokens, target_chars
    );

    let mut pieces = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = (cursor + target_chars).min(end);
        let mut chunk = TextChunk::from_span(chars, cursor, next, "semantic");
        chunk.metadata.insert("split".to_string(), "forced".to_string());
        pieces.push(chunk);
        cursor = next;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans_of(text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        sentence_spans(&chars)
            .into_iter()
            .map(|(s, e)| chars[s..e].iter().collect())
            .collect()
    }

    #[test]
    fn test_sentence_spans_keep_punctuation() {
        assert_eq!(
            spans_of("你好。今天讲Rust！Really? Yes.\nDone"),
            vec!["你好。", "今天讲Rust！", "Really? ", "Yes.\n", "Done"]
        );
    }

    #[test]
    fn test_sentence_spans_punctuation_runs_and_quotes() {
        assert_eq!(
            spans_of("真的吗？！\u{201D}对 v1.2 is out... ok"),
            vec!["真的吗？！\u{201D}", "对 v1.2 is out... ", "ok"]
        );
    }

    #[test]
    fn test_sentence_spans_tile_input() {
        let text = "a. b! c?\n\nd";
        assert_eq!(spans_of(text).concat(), text);
    }
}
