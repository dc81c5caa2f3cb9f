//! Tolk - LLM transcript analysis
//!
//! A local-first CLI tool and library that turns subtitles and transcripts
//! into structured analysis with a large language model.
//!
//! The name "Tolk" comes from the Norwegian/Scandinavian word for "interpreter."
//!
//! # Overview
//!
//! Tolk allows you to:
//! - Clean noisy subtitle and transcript text (SRT, WebVTT, JSON subtitles)
//! - Split long transcripts into token-bounded chunks
//! - Summarize, extract key points, categorize and tag content
//! - Keep spend under daily, weekly and monthly quotas
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management and prompt templates
//! - `preprocess` - Noise removal and line merging
//! - `chunking` - Token-bounded chunking strategies
//! - `llm` - Provider abstraction, pricing and retries
//! - `cache` - TTL/LRU result cache
//! - `quota` - Usage ledger and quota windows
//! - `analysis` - Result types, response parsing and merging
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use tolk::config::Settings;
//! use tolk::orchestrator::Orchestrator;
//! use tolk::preprocess::SubtitleFormat;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let transcript = std::fs::read_to_string("talk.srt")?;
//!     let result = orchestrator
//!         .analyze(&transcript, SubtitleFormat::Srt, None)
//!         .await?;
//!     println!("{}", result.summary);
//!
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod cache;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod preprocess;
pub mod quota;

pub use error::{Result, TolkError};
