//! Token counting.
//!
//! Chunk sizes are measured in model tokens. An exact tokenizer is used when
//! one is configured (`hf-tokenizer` feature), otherwise a script-aware
//! estimate.

use crate::preprocess::is_cjk;

/// Counts tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    /// Estimated or exact token count of `text`.
    fn count(&self, text: &str) -> usize;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Heuristic estimator: each CJK character and each non-CJK word carry a
/// fixed token weight.
#[derive(Debug, Clone)]
pub struct HeuristicCounter {
    cjk_weight: f64,
    word_weight: f64,
}

impl Default for HeuristicCounter {
    fn default() -> Self {
        Self::new(2.0, 1.3)
    }
}

impl HeuristicCounter {
    pub fn new(cjk_weight: f64, word_weight: f64) -> Self {
        Self {
            cjk_weight,
            word_weight,
        }
    }

    /// Number of CJK characters and non-CJK words in `text`.
    ///
    /// A word is a run of non-CJK, non-whitespace characters containing at
    /// least one alphanumeric character, so stray punctuation is free.
    pub fn census(text: &str) -> (usize, usize) {
        let mut cjk = 0;
        let mut words = 0;
        let mut in_word = false;
        let mut word_has_alnum = false;

        for c in text.chars() {
            if is_cjk(c) || c.is_whitespace() {
                if in_word && word_has_alnum {
                    words += 1;
                }
                in_word = false;
                word_has_alnum = false;
                if is_cjk(c) {
                    cjk += 1;
                }
            } else {
                in_word = true;
                word_has_alnum |= c.is_alphanumeric();
            }
        }
        if in_word && word_has_alnum {
            words += 1;
        }

        (cjk, words)
    }
}

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        let (cjk, words) = Self::census(text);
        (cjk as f64 * self.cjk_weight + words as f64 * self.word_weight).ceil() as usize
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Exact counts from a Hugging Face tokenizer.
#[cfg(feature = "hf-tokenizer")]
pub struct HfTokenCounter {
    tokenizer: tokenizers::Tokenizer,
    fallback: HeuristicCounter,
}

#[cfg(feature = "hf-tokenizer")]
impl HfTokenCounter {
    /// Load a tokenizer from the Hugging Face hub.
    pub fn from_pretrained(repo: &str) -> crate::error::Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_pretrained(repo, None).map_err(|e| {
            crate::error::TolkError::Config(format!("Failed to load tokenizer {}: {}", repo, e))
        })?;
        Ok(Self {
            tokenizer,
            fallback: HeuristicCounter::default(),
        })
    }
}

#[cfg(feature = "hf-tokenizer")]
impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(err) => {
                tracing::error!(error = %err, "Tokenizer failed to encode text, using estimate");
                self.fallback.count(text)
            }
        }
    }

    fn name(&self) -> &str {
        "hf-tokenizer"
    }
}
