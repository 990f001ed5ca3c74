//! Tokenizer selection.
//!
//! `answer.tokenizer = "approx"` (default) counts `ceil(chars / 4)`.
//! `"whitespace"` counts words. `"hf"` loads a Hugging Face
//! `tokenizer.json` from `answer.tokenizer_path` and needs the
//! `hf-tokenizer` feature.

use std::sync::Arc;

use anyhow::{bail, Result};

use drive_qa_core::tokenizer::{ApproxTokenizer, Tokenizer, WhitespaceTokenizer};

use crate::config::AnswerSettings;

/// Build the tokenizer named in configuration.
pub fn create_tokenizer(settings: &AnswerSettings) -> Result<Arc<dyn Tokenizer>> {
    match settings.tokenizer.as_str() {
        "approx" => Ok(Arc::new(ApproxTokenizer)),
        "whitespace" => Ok(Arc::new(WhitespaceTokenizer)),
        #[cfg(feature = "hf-tokenizer")]
        "hf" => {
            let Some(path) = settings.tokenizer_path.as_deref() else {
                bail!("answer.tokenizer_path is required when answer.tokenizer = \"hf\"");
            };
            Ok(Arc::new(hf::HfTokenizer::from_file(path)?))
        }
        #[cfg(not(feature = "hf-tokenizer"))]
        "hf" => bail!("The hf tokenizer requires --features hf-tokenizer"),
        other => bail!("Unknown tokenizer: {}", other),
    }
}

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use std::path::Path;

    use anyhow::{anyhow, Result};
    use tracing::warn;

    use drive_qa_core::tokenizer::{ApproxTokenizer, Tokenizer};

    /// Exact counts from a Hugging Face tokenizer file.
    pub struct HfTokenizer {
        inner: tokenizers::Tokenizer,
    }

    impl HfTokenizer {
        pub fn from_file(path: &Path) -> Result<Self> {
            let inner = tokenizers::Tokenizer::from_file(path)
                .map_err(|e| anyhow!("Failed to load tokenizer {}: {}", path.display(), e))?;
            Ok(Self { inner })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn count_tokens(&self, text: &str) -> usize {
            match self.inner.encode(text, false) {
                Ok(encoding) => encoding.len(),
                Err(e) => {
                    warn!(error = %e, "tokenizer encode failed, using approximation");
                    ApproxTokenizer.count_tokens(text)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_approx() {
        let tokenizer = create_tokenizer(&AnswerSettings::default()).unwrap();
        assert_eq!(tokenizer.count_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_whitespace() {
        let settings = AnswerSettings {
            tokenizer: "whitespace".to_string(),
            ..Default::default()
        };
        let tokenizer = create_tokenizer(&settings).unwrap();
        assert_eq!(tokenizer.count_tokens("a bb ccc"), 3);
    }

    #[test]
    fn test_unknown_tokenizer() {
        let settings = AnswerSettings {
            tokenizer: "bpe-magic".to_string(),
            ..Default::default()
        };
        assert!(create_tokenizer(&settings).is_err());
    }
}
