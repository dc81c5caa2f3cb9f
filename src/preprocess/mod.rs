//! Transcript cleaning.
//!
//! Removes subtitle noise (timestamps, laughter runs, emoji-only lines,
//! numeric spam) and glues broken subtitle lines back into sentences.
//! Everything here is a pure function of its input.

mod format;

pub use format::{decode, SubtitleFormat};

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Line-level noise patterns. A trimmed line matching any of them is dropped.
const NOISE_PATTERNS: &[&str] = &[
    // Bare timestamps and cue timings.
    r"^\[?\d{1,2}:\d{2}(:\d{2})?([.,]\d{1,3})?\]?$",
    r"^\d{1,2}:\d{2}(:\d{2})?([.,]\d{1,3})?\s*-->\s*\d{1,2}:\d{2}(:\d{2})?([.,]\d{1,3})?$",
    // Punctuation runs.
    r"^[!！]{2,}$",
    r"^[?？]{2,}$",
    r"^[。.…]{2,}$",
    // Laughter and filler.
    r"^[哈呵嘿嘻啊哦呀哇]{2,}[!！~～]*$",
    r"(?i)^(ha){2,}h?$",
    r"(?i)^(he){2,}$",
    r"(?i)^(lol)+$",
    r"(?i)^a{2,}h*$",
    r"(?i)^o{2,}h*$",
    r"(?i)^w{2,}$",
    r"^[赞顶]{2,}$",
    // Numeric spam.
    r"^(6{3,}|8{3,}|9{3,})$",
    r"^[1-9]\d{2}$",
    // Emoji-only lines.
    r"^[\p{Extended_Pictographic}\p{Emoji_Modifier}\x{FE0F}\x{200D}\s]+$",
];

const SENTENCE_TERMINALS: &[char] = &['。', '！', '？', '!', '?', '.', '…'];
const CLOSING_MARKS: &[char] = &['"', '\'', '”', '’', '」', '』', ')', '）', ']', '】'];

/// Whether a character belongs to a CJK script (Han, kana, hangul).
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

fn is_cjk_punctuation(c: char) -> bool {
    matches!(c, '\u{3000}'..='\u{303F}' | '\u{FF00}'..='\u{FFEF}')
}

/// Diagnostic statistics about a cleaned transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    pub total_chars: usize,
    /// Whitespace-separated words.
    pub total_words: usize,
    pub total_sentences: usize,
    pub cjk_chars: usize,
    /// Runs of ASCII letters.
    pub latin_words: usize,
    /// Share of characters that are CJK.
    pub cjk_ratio: f64,
}

/// Cleans raw transcripts.
pub struct TextPreprocessor {
    noise: RegexSet,
}

impl Default for TextPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextPreprocessor {
    pub fn new() -> Self {
        Self {
            noise: RegexSet::new(NOISE_PATTERNS).expect("noise patterns are valid"),
        }
    }

    /// Decode, clean and merge a raw transcript.
    pub fn preprocess(&self, raw: &str, format: SubtitleFormat) -> String {
        let decoded = decode(raw, format);
        let lines = self.clean_lines(&decoded);
        let text = merge_lines(&lines);

        let stats = text_stats(&text);
        info!(
            chars = stats.total_chars,
            words = stats.total_words,
            sentences = stats.total_sentences,
            cjk_ratio = stats.cjk_ratio,
            "Preprocessed transcript"
        );

        text
    }

    /// Trimmed, non-empty lines that are not noise.
    pub fn clean_lines<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut kept = Vec::new();
        let mut dropped = 0usize;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if self.is_noise(line) {
                dropped += 1;
            } else {
                kept.push(line);
            }
        }

        debug!("Dropped {} noise lines, kept {}", dropped, kept.len());
        kept
    }

    /// Whether a single trimmed line is subtitle noise.
    pub fn is_noise(&self, line: &str) -> bool {
        self.noise.is_match(line)
    }
}

/// Join lines into sentences.
///
/// A line that does not end in terminal punctuation continues on the next
/// line. CJK-to-CJK joins are concatenated, every other join gets a space.
/// Lines that do end a sentence stay on their own line.
pub fn merge_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    let mut prev: Option<&str> = None;

    for line in lines {
        if let Some(p) = prev {
            if ends_sentence(p) {
                out.push('\n');
            } else if joins_directly(p, line) {
                // CJK text has no word separator.
            } else {
                out.push(' ');
            }
        }
        out.push_str(line);
        prev = Some(line);
    }

    out
}

fn ends_sentence(line: &str) -> bool {
    line.trim_end_matches(CLOSING_MARKS)
        .chars()
        .last()
        .map(|c| SENTENCE_TERMINALS.contains(&c))
        .unwrap_or(false)
}

fn joins_directly(prev: &str, next: &str) -> bool {
    let last = prev.chars().last();
    let first = next.chars().next();
    match (last, first) {
        (Some(l), Some(f)) => (is_cjk(l) || is_cjk_punctuation(l)) && (is_cjk(f) || is_cjk_punctuation(f)),
        _ => false,
    }
}

/// Compute character, word and sentence statistics.
pub fn text_stats(text: &str) -> TextStats {
    let total_chars = text.chars().count();
    let cjk_chars = text.chars().filter(|c| is_cjk(*c)).count();
    let total_words = text.split_whitespace().count();
    let total_sentences = text
        .split(|c: char| SENTENCE_TERMINALS.contains(&c) || c == '\n')
        .filter(|s| !s.trim().is_empty())
        .count();
    let latin_words = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .count();

    TextStats {
        total_chars,
        total_words,
        total_sentences,
        cjk_chars,
        latin_words,
        cjk_ratio: if total_chars > 0 {
            cjk_chars as f64 / total_chars as f64
        } else {
            0.0
        },
    }
}
