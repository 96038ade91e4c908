//! Token-aware truncation of submission text before it enters a prompt.
//!
//! Extracted slide text can be arbitrarily long while the local model's
//! context is small, so each prompt field is cut to a budget. Token counts use
//! the `cl100k_base` tokenizer as an approximation of the served model's own.

use once_cell::sync::Lazy;
use tiktoken_rs::{cl100k_base, CoreBPE};

static BPE: Lazy<Option<CoreBPE>> = Lazy::new(|| cl100k_base().ok());

/// Rough chars-per-token ratio used when the tokenizer is unavailable.
const FALLBACK_CHARS_PER_TOKEN: usize = 4;

/// Count tokens in text using cl100k_base.
pub fn count_tokens(text: &str) -> usize {
    match BPE.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(FALLBACK_CHARS_PER_TOKEN),
    }
}

/// Keep at most `max_tokens` tokens of `text`.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    if max_tokens == 0 {
        return String::new();
    }
    let Some(bpe) = BPE.as_ref() else {
        return truncate_chars(text, max_tokens.saturating_mul(FALLBACK_CHARS_PER_TOKEN));
    };

    let tokens = bpe.encode_with_special_tokens(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }

    // A cut can land inside a multi-byte character; back off until it decodes.
    let mut end = max_tokens;
    while end > 0 {
        if let Ok(decoded) = bpe.decode(tokens[..end].to_vec()) {
            return decoded;
        }
        end -= 1;
    }
    String::new()
}

/// Keep at most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Per-field limits applied when rendering a judge prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentBudget {
    pub problem_tokens: usize,
    pub content_tokens: usize,
    pub visual_chars: usize,
}

impl Default for ContentBudget {
    fn default() -> Self {
        Self {
            problem_tokens: 256,
            content_tokens: 2_500,
            visual_chars: 300,
        }
    }
}
