//! CLI command implementations.

mod analyze;
mod chunk;
mod config;
mod doctor;
mod quota;
mod recommend;

pub use analyze::run_analyze;
pub use chunk::run_chunk;
pub use config::run_config;
pub use doctor::run_doctor;
pub use quota::run_quota;
pub use recommend::run_recommend;

use crate::preprocess::SubtitleFormat;
use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Read a transcript from a file (or stdin for `-`) and resolve its format.
///
/// `auto` picks the format from the file extension, plain text otherwise.
fn read_input(input: &str, format: &str) -> Result<(String, SubtitleFormat)> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read transcript from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read transcript: {}", input))?
    };

    Ok((text, resolve_format(input, format)?))
}

fn resolve_format(input: &str, format: &str) -> Result<SubtitleFormat> {
    if format.eq_ignore_ascii_case("auto") {
        return Ok(SubtitleFormat::from_extension(Path::new(input)));
    }
    format
        .parse::<SubtitleFormat>()
        .map_err(|e| anyhow::anyhow!("{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_format() {
        assert_eq!(resolve_format("talk.srt", "auto").unwrap(), SubtitleFormat::Srt);
        assert_eq!(resolve_format("-", "auto").unwrap(), SubtitleFormat::Plain);
        assert_eq!(resolve_format("talk.txt", "vtt").unwrap(), SubtitleFormat::Vtt);
        assert!(resolve_format("talk.txt", "docx").is_err());
    }
}
