//! Subtitle input decoding (plain, JSON, SRT, WebVTT).
//!
//! Turns a subtitle document into plain lines of spoken text. Cue numbers,
//! timing lines and headers are dropped; everything else is kept verbatim
//! for the noise filter to judge.

use serde::Deserialize;
use tracing::warn;

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubtitleFormat {
    /// Already plain text, one utterance per line.
    #[default]
    Plain,
    /// JSON subtitle document with a `body` array of `{ "content": .. }` cues.
    Json,
    /// SubRip.
    Srt,
    /// WebVTT.
    Vtt,
}

impl std::str::FromStr for SubtitleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" | "txt" => Ok(SubtitleFormat::Plain),
            "json" => Ok(SubtitleFormat::Json),
            "srt" => Ok(SubtitleFormat::Srt),
            "vtt" | "webvtt" => Ok(SubtitleFormat::Vtt),
            _ => Err(format!("Unknown format: {}. Use plain, json, srt, or vtt.", s)),
        }
    }
}

impl std::fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtitleFormat::Plain => write!(f, "plain"),
            SubtitleFormat::Json => write!(f, "json"),
            SubtitleFormat::Srt => write!(f, "srt"),
            SubtitleFormat::Vtt => write!(f, "vtt"),
        }
    }
}

impl SubtitleFormat {
    /// Guess the format from a file extension, defaulting to plain text.
    pub fn from_extension(path: &std::path::Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct JsonSubtitle {
    body: Vec<JsonCue>,
}

#[derive(Debug, Deserialize)]
struct JsonCue {
    #[serde(default)]
    content: Option<String>,
}

/// Decode a subtitle document into newline-separated text.
pub fn decode(raw: &str, format: SubtitleFormat) -> String {
    match format {
        SubtitleFormat::Plain => raw.to_string(),
        SubtitleFormat::Json => decode_json(raw),
        SubtitleFormat::Srt => decode_cues(raw, false),
        SubtitleFormat::Vtt => decode_cues(raw, true),
    }
}

fn decode_json(raw: &str) -> String {
    match serde_json::from_str::<JsonSubtitle>(raw) {
        Ok(doc) => doc
            .body
            .into_iter()
            .filter_map(|cue| cue.content)
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            warn!("Subtitle JSON not recognised, treating input as plain text: {}", e);
            raw.to_string()
        }
    }
}

fn decode_cues(raw: &str, webvtt: bool) -> String {
    let mut lines = Vec::new();
    let mut in_note = false;

    for line in raw.lines() {
        let line = line.trim();

        if line.is_empty() {
            in_note = false;
            continue;
        }
        if in_note || line.contains("-->") || line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if webvtt {
            if line.starts_with("WEBVTT") || line.starts_with("STYLE") || line.starts_with("REGION") {
                continue;
            }
            if line.starts_with("NOTE") {
                in_note = true;
                continue;
            }
        }

        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_srt() {
        let srt = "1\n00:00:01,000 --> 00:00:03,000\nHello there.\n\n2\n00:00:03,500 --> 00:00:05,000\nGeneral Kenobi\n";
        assert_eq!(decode(srt, SubtitleFormat::Srt), "Hello there.\nGeneral Kenobi");
    }

    #[test]
    fn test_decode_vtt_skips_header_and_notes() {
        let vtt = "WEBVTT\n\nNOTE produced by hand\nstill a note\n\nintro\n00:00.000 --> 00:02.000\n第一句话\n";
        assert_eq!(decode(vtt, SubtitleFormat::Vtt), "intro\n第一句话");
    }

    #[test]
    fn test_decode_json_body() {
        let json = r#"{"font_size":0.4,"body":[{"from":0.0,"to":1.5,"content":"大家好"},{"from":1.5,"to":3.0,"content":"今天讲 Rust"}]}"#;
        assert_eq!(decode(json, SubtitleFormat::Json), "大家好\n今天讲 Rust");
    }

    #[test]
    fn test_decode_invalid_json_falls_back_to_plain() {
        let raw = "not json at all";
        assert_eq!(decode(raw, SubtitleFormat::Json), raw);
    }

    #[test]
    fn test_format_from_extension() {
        use std::path::Path;
        assert_eq!(SubtitleFormat::from_extension(Path::new("a.SRT")), SubtitleFormat::Srt);
        assert_eq!(SubtitleFormat::from_extension(Path::new("a.vtt")), SubtitleFormat::Vtt);
        assert_eq!(SubtitleFormat::from_extension(Path::new("a.md")), SubtitleFormat::Plain);
    }
}
