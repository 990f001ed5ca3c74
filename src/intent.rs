//! Query intent classification.
//!
//! One low-temperature completion sorts a free-form query into an
//! [`Intent`]. Classification never fails outright: an unusable model
//! reply, or a failed completion, yields [`Intent::GeneralKnowledge`] with
//! a low confidence and the reason.

use serde::{Deserialize, Serialize};
use tracing::warn;

use drive_qa_core::completion::{ChatMessage, CompletionProvider, CompletionRequest};

const CLASSIFIER_TEMPERATURE: f32 = 0.1;
const CLASSIFIER_MAX_TOKENS: u32 = 200;

const CLASSIFIER_SYSTEM: &str =
    "You are a precise intent classifier. Always respond with valid JSON only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Find or ask about the user's own documents.
    DocumentSearch,
    GeneralKnowledge,
    CreateDocument,
    /// Upload, delete, organize, or move files.
    FileManagement,
}

impl Intent {
    /// Whether answering should consult the document index.
    pub fn uses_documents(self) -> bool {
        self == Intent::DocumentSearch
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
    pub reasoning: String,
}

impl Classification {
    fn fallback(confidence: f32, reasoning: String) -> Self {
        Self {
            intent: Intent::GeneralKnowledge,
            confidence,
            reasoning,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn classifier_prompt(query: &str) -> String {
    format!(
        r#"You are an intent classifier for a Google Drive integration system.

Classify the user's intent into one of these categories:

1. **document_search** - User wants to find, search, or ask about their personal documents/files
   Examples: "find my documents about AI", "search for files", "what documents do I have", "look through my files"

2. **general_knowledge** - User asks general questions not related to their personal documents
   Examples: "what is machine learning", "explain quantum physics", "how does photosynthesis work"

3. **create_document** - User wants to create, write, generate, or make a new document
   Examples: "create a summary", "write a report", "generate a document", "make a list"

4. **file_management** - User wants to manage files (upload, delete, organize, move)
   Examples: "upload a file", "delete documents", "organize my files", "move files to folder"

User query: "{query}"

Respond with ONLY a valid JSON object:
{{
    "intent": "category_name",
    "confidence": 0.95,
    "reasoning": "Brief explanation of why this intent was chosen"
}}"#
    )
}

/// Parse a classifier reply, tolerating a ```json fence around it.
pub fn parse_intent(text: &str) -> Classification {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }

    let raw: RawClassification = match serde_json::from_str(body.trim()) {
        Ok(raw) => raw,
        Err(e) => return Classification::fallback(0.3, format!("JSON parsing failed: {}", e)),
    };

    let label = raw.intent.unwrap_or_default();
    match serde_json::from_value::<Intent>(serde_json::Value::String(label.clone())) {
        Ok(intent) => Classification {
            intent,
            confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            reasoning: raw.reasoning.unwrap_or_default(),
        },
        Err(_) => Classification::fallback(
            0.5,
            format!(
                "Invalid intent '{}' received, defaulting to general_knowledge",
                label
            ),
        ),
    }
}

/// Classify `query` with one completion call.
pub async fn classify_intent(completer: &dyn CompletionProvider, query: &str) -> Classification {
    let request = CompletionRequest {
        messages: vec![
            ChatMessage::system(CLASSIFIER_SYSTEM),
            ChatMessage::user(classifier_prompt(query)),
        ],
        temperature: CLASSIFIER_TEMPERATURE,
        max_tokens: CLASSIFIER_MAX_TOKENS,
    };
    match completer.complete(&request).await {
        Ok(text) => parse_intent(&text),
        Err(e) => {
            warn!(error = %e, "intent classification failed");
            Classification::fallback(0.2, format!("Classification error: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use drive_qa_core::QaError;

    #[test]
    fn test_parse_plain_json() {
        let c = parse_intent(r#"{"intent": "document_search", "confidence": 0.9, "reasoning": "mine"}"#);
        assert_eq!(c.intent, Intent::DocumentSearch);
        assert!((c.confidence - 0.9).abs() < 1e-6);
        assert_eq!(c.reasoning, "mine");
        assert!(c.intent.uses_documents());
    }

    #[test]
    fn test_parse_fenced_json() {
        let c = parse_intent("```json\n{\"intent\": \"create_document\"}\n```");
        assert_eq!(c.intent, Intent::CreateDocument);
        assert!(!c.intent.uses_documents());
    }

    #[test]
    fn test_unknown_label_falls_back() {
        let c = parse_intent(r#"{"intent": "weather"}"#);
        assert_eq!(c.intent, Intent::GeneralKnowledge);
        assert!(c.reasoning.contains("weather"));
    }

    #[test]
    fn test_garbage_falls_back() {
        let c = parse_intent("sure! it's document search");
        assert_eq!(c.intent, Intent::GeneralKnowledge);
        assert!((c.confidence - 0.3).abs() < 1e-6);
    }

    struct Broken;

    #[async_trait]
    impl CompletionProvider for Broken {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn complete(&self, _request: &CompletionRequest) -> drive_qa_core::Result<String> {
            Err(QaError::CompletionFailed("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_completion_failure_falls_back() {
        let c = classify_intent(&Broken, "find my notes").await;
        assert_eq!(c.intent, Intent::GeneralKnowledge);
        assert!(c.reasoning.contains("down"));
    }
}
