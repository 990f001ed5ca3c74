//! Token counting.
//!
//! The answer engine measures prompts through the [`Tokenizer`] trait.
//! [`ApproxTokenizer`] is the default: a 4 chars ≈ 1 token heuristic that
//! tracks BPE encoders closely enough for budget enforcement on English
//! text. The app crate can swap in a Hugging Face tokenizer file.

/// Counts tokens in a text. Pure and deterministic.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Character-ratio tokenizer: `ceil(chars / 4)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenizer;

impl Tokenizer for ApproxTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// Counts whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
