//! CLI output formatting utilities.

use crate::analysis::{AggregatedAnalysisResult, KnowledgeEntry};
use crate::chunking::TextChunk;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print an aggregated analysis.
    pub fn analysis(result: &AggregatedAnalysisResult) {
        Output::header("Summary");
        println!("  {}", result.summary);

        if !result.key_points.is_empty() {
            Output::header("Key points");
            for point in &result.key_points {
                Output::list_item(point);
            }
        }

        if !result.categories.is_empty() {
            Output::header("Categories");
            println!("  {}", result.categories.join(", "));
        }

        if !result.tags.is_empty() {
            Output::header("Tags");
            println!(
                "  {}",
                result
                    .tags
                    .iter()
                    .map(|t| style(format!("#{}", t)).cyan().to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }

        if !result.knowledge_entries.is_empty() {
            Output::header("Knowledge");
            for entry in &result.knowledge_entries {
                Output::knowledge_entry(entry);
            }
        }

        Output::header("Usage");
        Output::kv("Model", &result.model_used);
        Output::kv("Chunks", &result.chunk_count.to_string());
        Output::kv("Tokens", &result.total_tokens.to_string());
        Output::kv("Cost", &format!("${:.4}", result.total_cost));
        Output::kv("Time", &format_duration(result.analysis_time));
    }

    fn knowledge_entry(entry: &KnowledgeEntry) {
        println!(
            "  {} {} ({}, importance {})",
            style("*").cyan(),
            style(&entry.title).bold(),
            style(&entry.entry_type).dim(),
            entry.importance
        );
        if !entry.content.is_empty() {
            println!("    {}", content_preview(&entry.content, 200));
        }
    }

    /// Print one chunk with its span and size.
    pub fn chunk(index: usize, chunk: &TextChunk, tokens: usize) {
        println!(
            "\n{} {} [{}..{}] {} tokens{}",
            style(">>").green(),
            style(format!("Chunk {}", index + 1)).bold(),
            chunk.start_index,
            chunk.end_index,
            tokens,
            match chunk.overlap_chars() {
                0 => String::new(),
                n => format!(", {} overlap chars", n),
            }
        );
        println!("   {}", content_preview(&chunk.content, 200));
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format duration in seconds to a human-readable string.
fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{:.1}s", seconds)
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        format!("{}...", content.chars().take(max_chars).collect::<String>())
    }
}
