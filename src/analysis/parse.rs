//! Turning model responses into analysis results.
//!
//! The structured parse expects a JSON object, possibly wrapped in prose or
//! a code fence. When that fails the heuristic parser reads section headers
//! and bullet lines instead; it never fails.

use super::{ChunkAnalysisResult, KnowledgeEntry};
use crate::error::{Result, TolkError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Parse a response, falling back to the heuristic parser.
pub fn parse_response(response: &str) -> ChunkAnalysisResult {
    match parse_structured(response) {
        Ok(result) => result,
        Err(e) => {
            warn!("Structured parse failed, using heuristic parser: {}", e);
            parse_heuristic(response)
        }
    }
}

/// Read the outermost JSON object in `response`, field by field.
///
/// A field of the wrong type is dropped on its own; the rest of the object
/// is kept. List fields also accept a comma-separated string. Fails only
/// when the response holds no parseable JSON object.
pub fn parse_structured(response: &str) -> Result<ChunkAnalysisResult> {
    let json = extract_json_object(response).ok_or_else(|| {
        TolkError::MalformedResponse(format!(
            "No JSON object in response: {}",
            preview(response)
        ))
    })?;

    let value: Value = serde_json::from_str(json).map_err(|e| {
        TolkError::MalformedResponse(format!("{}. Response was: {}", e, preview(response)))
    })?;
    let Value::Object(map) = value else {
        return Err(TolkError::MalformedResponse(format!(
            "Expected a JSON object: {}",
            preview(response)
        )));
    };

    Ok(ChunkAnalysisResult {
        summary: map.get("summary").map(text_of).unwrap_or_default(),
        key_points: map.get("key_points").map(list_of).unwrap_or_default(),
        categories: map.get("categories").map(list_of).unwrap_or_default(),
        tags: map.get("tags").map(list_of).unwrap_or_default(),
        knowledge_entries: map
            .get("knowledge_entries")
            .map(knowledge_of)
            .unwrap_or_default(),
        ..ChunkAnalysisResult::default()
    })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn list_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => strings_of(items),
        Value::String(s) => split_list(s).collect(),
        _ => Vec::new(),
    }
}

fn knowledge_of(value: &Value) -> Vec<KnowledgeEntry> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match KnowledgeEntry::deserialize(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable knowledge entry: {}", e);
                None
            }
        })
        .collect()
}

fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

fn preview(response: &str) -> String {
    response.chars().take(200).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Summary,
    KeyPoints,
    Categories,
    Tags,
    Knowledge,
}

const SECTION_KEYWORDS: &[(Section, &[&str])] = &[
    (Section::Summary, &["总结", "摘要", "summary"]),
    (Section::KeyPoints, &["关键点", "要点", "key point", "key_point", "keypoint"]),
    (Section::Categories, &["分类", "类别", "categor"]),
    (Section::Tags, &["标签", "tag"]),
    (Section::Knowledge, &["知识", "knowledge"]),
];

/// Header lines are short; longer lines mentioning a keyword are content.
const MAX_HEADER_CHARS: usize = 30;
const MAX_LATIN_HEADER_WORDS: usize = 3;

/// Recognise a section header, returning any content after a colon.
fn parse_header(line: &str) -> Option<(Section, Option<&str>)> {
    let stripped = line
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '*' || c.is_whitespace());

    let (head, rest) = match stripped.find([':', '：']) {
        Some(i) => {
            let colon_len = stripped[i..].chars().next().map_or(1, char::len_utf8);
            (&stripped[..i], Some(stripped[i + colon_len..].trim()))
        }
        None => (stripped, None),
    };

    let head = head.trim().trim_end_matches('*');
    if head.chars().count() > MAX_HEADER_CHARS
        || (head.is_ascii() && head.split_whitespace().count() > MAX_LATIN_HEADER_WORDS)
    {
        return None;
    }

    let lower = head.to_lowercase();
    SECTION_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| has_keyword(&lower, k)))
        .map(|(section, _)| (*section, rest.filter(|r| !r.is_empty())))
}

/// Latin keywords must start a word ("tag" is not in "stage"); CJK
/// keywords match anywhere.
fn has_keyword(head: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return head.contains(keyword);
    }
    head.match_indices(keyword).any(|(i, _)| {
        head[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

/// Strip a list marker (`-`, `•`, `*`, `·`, `1.`, `1)`, `1、`).
fn strip_bullet(line: &str) -> Option<&str> {
    for marker in ['-', '•', '·'] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    // `*` only as a list marker, not as markdown emphasis.
    if let Some(rest) = line.strip_prefix("* ") {
        return Some(rest.trim());
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        for marker in ['.', ')', '、'] {
            if let Some(item) = rest.strip_prefix(marker) {
                return Some(item.trim());
            }
        }
    }
    None
}

fn split_list(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split([',', '，', '、', ';', '；'])
        .map(|s| s.trim().trim_matches('#').trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Best-effort line parser. Never fails.
///
/// A response without any recognisable structure is taken as a plain
/// summary.
pub fn parse_heuristic(response: &str) -> ChunkAnalysisResult {
    let mut result = ChunkAnalysisResult::default();
    let mut section: Option<Section> = None;
    let mut summary_lines: Vec<&str> = Vec::new();

    for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let bullet = strip_bullet(line);
        if bullet.is_none() {
            if let Some((found, inline)) = parse_header(line) {
                section = Some(found);
                if let Some(content) = inline {
                    push_content(&mut result, &mut summary_lines, found, content, false);
                }
                continue;
            }
        }

        let Some(current) = section else {
            continue;
        };

        match bullet {
            Some(item) if !item.is_empty() => {
                push_content(&mut result, &mut summary_lines, current, item, true)
            }
            Some(_) => {}
            None => push_content(&mut result, &mut summary_lines, current, line, false),
        }
    }

    result.summary = summary_lines.join(" ");

    let nothing_found = result.summary.is_empty()
        && result.key_points.is_empty()
        && result.categories.is_empty()
        && result.tags.is_empty();
    if nothing_found {
        result.summary = response.trim().to_string();
    }

    result
}

fn push_content<'a>(
    result: &mut ChunkAnalysisResult,
    summary_lines: &mut Vec<&'a str>,
    section: Section,
    content: &'a str,
    is_bullet: bool,
) {
    match section {
        Section::Summary => summary_lines.push(content),
        Section::KeyPoints if is_bullet => result.key_points.push(content.to_string()),
        Section::KeyPoints => {}
        Section::Categories if is_bullet => result.categories.push(content.to_string()),
        Section::Categories => result.categories.extend(split_list(content)),
        Section::Tags if is_bullet => result.tags.push(content.trim_matches('#').to_string()),
        Section::Tags => result.tags.extend(split_list(content)),
        Section::Knowledge => {}
    }
}

/// Parse a list-valued single-task response.
///
/// Accepts `{"<field>": [..]}`, a bare JSON array, or bulleted and
/// comma-separated lines.
pub fn parse_list(response: &str, field: &str) -> Vec<String> {
    if let Some(json) = extract_json_object(response) {
        if let Ok(Value::Object(map)) = serde_json::from_str(json) {
            if let Some(Value::Array(items)) = map.get(field) {
                return strings_of(items);
            }
        }
    }

    if let (Some(start), Some(end)) = (response.find('['), response.rfind(']')) {
        if end > start {
            if let Ok(items) = serde_json::from_str::<Vec<Value>>(&response[start..=end]) {
                return strings_of(&items);
            }
        }
    }

    let mut items = Vec::new();
    for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let bullet = strip_bullet(line);
        if bullet.is_none() {
            if let Some((_, inline)) = parse_header(line) {
                items.extend(inline.into_iter().flat_map(split_list));
                continue;
            }
        }
        match bullet {
            Some(item) if !item.is_empty() => items.push(item.to_string()),
            Some(_) => {}
            None => items.extend(split_list(line)),
        }
    }
    items
}

fn strings_of(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
