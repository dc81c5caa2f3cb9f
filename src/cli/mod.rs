//! CLI module for Tolk.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Tolk - LLM transcript analysis
///
/// A local-first CLI tool that turns subtitles and transcripts into summaries,
/// key points, categories, tags and ranked knowledge entries.
/// The name "Tolk" comes from the Norwegian/Scandinavian word for "interpreter."
#[derive(Parser, Debug)]
#[command(name = "tolk")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a transcript or subtitle file
    Analyze {
        /// Transcript file path ("-" reads stdin)
        input: String,

        /// Input format (auto, plain, json, srt, vtt)
        #[arg(short, long, default_value = "auto")]
        format: String,

        /// LLM service to use (defaults to llm.default_service)
        #[arg(short, long)]
        service: Option<String>,

        /// Write the result as JSON to this file instead of printing it
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Preprocess and chunk a transcript without calling any model
    Chunk {
        /// Transcript file path ("-" reads stdin)
        input: String,

        /// Input format (auto, plain, json, srt, vtt)
        #[arg(short, long, default_value = "auto")]
        format: String,

        /// Maximum tokens per chunk (overrides chunking.max_tokens)
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Overlap tokens between chunks (overrides chunking.overlap_tokens)
        #[arg(long)]
        overlap_tokens: Option<usize>,

        /// Use fixed-size chunking instead of sentence-based chunking
        #[arg(long)]
        fixed: bool,
    },

    /// Show quota usage, or reset it
    Quota {
        /// Window to show (daily, weekly, monthly); all when omitted
        #[arg(short, long)]
        window: Option<String>,

        /// Clear recorded usage for the window (or all usage)
        #[arg(long)]
        reset: bool,
    },

    /// Recommend the cheapest model for a token count and budget
    Recommend {
        /// Expected token count
        #[arg(short, long)]
        tokens: u64,

        /// Budget in dollars
        #[arg(short, long)]
        budget: f64,
    },

    /// Check configuration and API keys
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::parse_from(["tolk", "-vv", "analyze", "talk.srt", "--service", "glm"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Analyze { input, format, service, output } => {
                assert_eq!(input, "talk.srt");
                assert_eq!(format, "auto");
                assert_eq!(service.as_deref(), Some("glm"));
                assert!(output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_recommend() {
        let cli = Cli::parse_from(["tolk", "recommend", "--tokens", "5000", "--budget", "0.01"]);
        assert!(matches!(cli.command, Commands::Recommend { tokens: 5000, .. }));
    }
}
