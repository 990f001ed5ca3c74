//! Tool trait, tool context, and the built-in document tools.
//!
//! Every operation the service exposes is a [`Tool`]: the HTTP layer serves
//! them at `POST /tools/{name}` and the MCP bridge lists the same registry.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                ToolRegistry                │
//! │  list_files  read_document  create_document│
//! │  search_documents  ask_question            │
//! │  reindex_documents  route_query            │
//! └──────────────┬─────────────────────────────┘
//!                ▼
//!     ToolContext ──▶ QaService (core)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use drive_qa::traits::ToolRegistry;
//!
//! let tools = ToolRegistry::with_builtins();
//! assert!(tools.find("ask_question").is_some());
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use drive_qa_core::completion::CompletionProvider;
use drive_qa_core::service::QaService;
use drive_qa_core::QaError;

use crate::intent::{classify_intent, Intent};

/// Characters of document text shown in search results.
const PREVIEW_CHARS: usize = 200;

/// Returned by `search_documents` when nothing has been indexed.
pub const EMPTY_INDEX_MESSAGE: &str = "No documents indexed. Run reindex_documents first.";

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A tool that agents can discover and call.
///
/// Tools are registered at server startup and exposed via `GET /tools/list`
/// for discovery and `POST /tools/{name}` for invocation.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use drive_qa::traits::{Tool, ToolContext};
///
/// pub struct IndexSizeTool;
///
/// #[async_trait]
/// impl Tool for IndexSizeTool {
///     fn name(&self) -> &str { "index_size" }
///     fn description(&self) -> &str { "Number of indexed documents" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         Ok(json!({ "count": ctx.service().index().len() }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name (`POST /tools/{name}`). Lowercase with underscores.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Built-in tools are marked `"builtin": true` in `GET /tools/list`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// Whether the tool leaves the index and the source unchanged.
    fn is_read_only(&self) -> bool {
        true
    }

    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool.
    ///
    /// `params` is always a JSON object. The returned value is wrapped in
    /// `{ "result": ... }` by the HTTP layer. Errors that are a
    /// [`QaError`] keep their HTTP mapping.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// What a tool can reach while executing.
#[derive(Clone)]
pub struct ToolContext {
    service: Arc<QaService>,
    completer: Arc<dyn CompletionProvider>,
}

impl ToolContext {
    pub fn new(service: Arc<QaService>, completer: Arc<dyn CompletionProvider>) -> Self {
        Self { service, completer }
    }

    pub fn service(&self) -> &QaService {
        &self.service
    }

    /// Completion provider used for intent classification.
    pub fn completer(&self) -> &dyn CompletionProvider {
        self.completer.as_ref()
    }
}

/// Check `params` against a tool's parameter schema and fill defaults.
///
/// `null` is treated as an empty object. Required keys must be present,
/// present keys must match their declared `type`, and absent keys with a
/// `default` get it. Unknown keys pass through untouched.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let mut obj = match params {
        Value::Null => serde_json::Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(QaError::InvalidRequest(format!(
                "parameters must be a JSON object, got {}",
                json_type_name(other)
            ))
            .into())
        }
    };

    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(key) {
                return Err(
                    QaError::InvalidRequest(format!("missing required parameter: {}", key)).into(),
                );
            }
        }
    }

    if let Some(properties) = schema["properties"].as_object() {
        for (name, prop) in properties {
            match obj.get(name) {
                Some(value) => {
                    let expected = prop["type"].as_str().unwrap_or("any");
                    let ok = match expected {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !ok {
                        return Err(QaError::InvalidRequest(format!(
                            "parameter '{}' must be of type '{}', got {}",
                            name,
                            expected,
                            json_type_name(value)
                        ))
                        .into());
                    }
                }
                None => {
                    if let Some(default) = prop.get("default") {
                        obj.insert(name.clone(), default.clone());
                    }
                }
            }
        }
    }

    Ok(Value::Object(obj))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    match params[key].as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(QaError::InvalidRequest(format!("{} must not be empty", key)).into()),
    }
}

fn optional_u64(params: &Value, key: &str) -> Result<Option<u64>> {
    match &params[key] {
        Value::Null => Ok(None),
        v => v
            .as_u64()
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or_else(|| {
                QaError::InvalidRequest(format!("{} must be a positive integer", key)).into()
            }),
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

/// Lists files at the document source.
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in Google Drive"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_size": { "type": "integer", "default": 10 },
                "mime_type": { "type": "string", "description": "Filter by MIME type" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let page_size = optional_u64(&params, "page_size")?
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX));
        let mime_type = params["mime_type"].as_str();
        let files = ctx.service().list_files(page_size, mime_type).await?;
        Ok(json!({ "files": files }))
    }
}

/// Reads one document's plain text.
pub struct ReadDocumentTool;

#[async_trait]
impl Tool for ReadDocumentTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "Read content from a Google Doc"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_id": { "type": "string", "description": "Document ID" }
            },
            "required": ["file_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let id = required_str(&params, "file_id")?;
        let content = ctx.service().read_document(id).await?;
        Ok(json!({ "id": id, "content": content }))
    }
}

/// Creates a new document.
pub struct CreateDocumentTool;

#[async_trait]
impl Tool for CreateDocumentTool {
    fn name(&self) -> &str {
        "create_document"
    }

    fn description(&self) -> &str {
        "Create a new Google Doc"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let title = required_str(&params, "title")?;
        let content = params["content"].as_str().unwrap_or("");
        let created = ctx.service().create_document(title, content).await?;
        Ok(serde_json::to_value(created)?)
    }
}

/// Semantic search over the index.
pub struct SearchDocumentsTool;

#[async_trait]
impl Tool for SearchDocumentsTool {
    fn name(&self) -> &str {
        "search_documents"
    }

    fn description(&self) -> &str {
        "Search documents using semantic similarity"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "max_results": { "type": "integer", "default": 5 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let max_results = optional_u64(&params, "max_results")?.map(|n| n as usize);

        let hits = ctx.service().search(query, max_results).await?;
        if hits.is_empty() && ctx.service().index().is_empty() {
            return Ok(json!({ "results": [], "message": EMPTY_INDEX_MESSAGE }));
        }

        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "score": hit.score,
                    "id": hit.record.id,
                    "name": hit.record.name,
                    "preview": preview(&hit.record.content),
                })
            })
            .collect();
        Ok(json!({ "results": results }))
    }
}

/// Answers a question, grounded in indexed documents when possible.
pub struct AskQuestionTool;

#[async_trait]
impl Tool for AskQuestionTool {
    fn name(&self) -> &str {
        "ask_question"
    }

    fn description(&self) -> &str {
        "Ask a question about your documents"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "use_documents": { "type": "boolean", "default": true }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let question = required_str(&params, "question")?;
        let use_documents = params["use_documents"].as_bool().unwrap_or(true);
        let answer = ctx.service().ask(question, use_documents).await?;
        Ok(serde_json::to_value(answer)?)
    }
}

/// Rebuilds the document index from the source.
pub struct ReindexDocumentsTool;

#[async_trait]
impl Tool for ReindexDocumentsTool {
    fn name(&self) -> &str {
        "reindex_documents"
    }

    fn description(&self) -> &str {
        "Rebuild the document index"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let report = ctx.service().rebuild_index().await?;
        Ok(serde_json::to_value(report)?)
    }
}

/// Classifies a free-form query and dispatches it.
///
/// | Intent | Action |
/// |--------|--------|
/// | `document_search` | `ask` with documents |
/// | `general_knowledge` | `ask` without documents |
/// | `create_document` | create a document titled after the query |
/// | `file_management` | list files |
pub struct RouteQueryTool;

#[async_trait]
impl Tool for RouteQueryTool {
    fn name(&self) -> &str {
        "route_query"
    }

    fn description(&self) -> &str {
        "Classify a request and route it to the matching tool"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let classification = classify_intent(ctx.completer(), query).await;

        let result = match classification.intent {
            Intent::DocumentSearch | Intent::GeneralKnowledge => {
                let answer = ctx
                    .service()
                    .ask(query, classification.intent.uses_documents())
                    .await?;
                serde_json::to_value(answer)?
            }
            Intent::CreateDocument => {
                let content = format!(
                    "Document created based on request: {}\n\nThis document was generated in response to your request.",
                    query
                );
                let created = ctx
                    .service()
                    .create_document(&format!("Document for: {}", query), &content)
                    .await?;
                serde_json::to_value(created)?
            }
            Intent::FileManagement => {
                let files = ctx.service().list_files(None, None).await?;
                json!({ "files": files })
            }
        };

        Ok(json!({
            "intent": classification,
            "result": result,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of callable tools.
///
/// [`ToolRegistry::with_builtins`] registers every document tool; call
/// [`register`](ToolRegistry::register) to add more.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with the seven built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ListFilesTool));
        registry.register(Box::new(ReadDocumentTool));
        registry.register(Box::new(CreateDocumentTool));
        registry.register(Box::new(SearchDocumentsTool));
        registry.register(Box::new(AskQuestionTool));
        registry.register(Box::new(ReindexDocumentsTool));
        registry.register(Box::new(RouteQueryTool));
        registry
    }

    /// Register a tool. A later tool with an existing name is shadowed.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Find a tool by name.
    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_have_unique_names() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 7);
        let mut names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 7);
        assert!(registry.tools().iter().all(|t| t.is_builtin()));
    }

    #[test]
    fn test_schemas_are_objects() {
        for tool in ToolRegistry::with_builtins().tools() {
            assert_eq!(tool.parameters_schema()["type"], "object", "{}", tool.name());
        }
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_required_str_rejects_blank() {
        let err = required_str(&json!({ "query": "  " }), "query").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QaError>(),
            Some(QaError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_fills_defaults() {
        let schema = SearchDocumentsTool.parameters_schema();
        let params = validate_params(&schema, &json!({ "query": "budget" })).unwrap();
        assert_eq!(params["max_results"], 5);
        assert_eq!(params["query"], "budget");
    }

    #[test]
    fn test_validate_rejects_missing_and_mistyped() {
        let schema = AskQuestionTool.parameters_schema();
        assert!(validate_params(&schema, &json!({})).is_err());
        assert!(validate_params(&schema, &json!({ "question": 5 })).is_err());
        assert!(validate_params(&schema, &json!({ "question": "q", "use_documents": "no" })).is_err());
        assert!(validate_params(&schema, &json!([1, 2])).is_err());
    }

    #[test]
    fn test_validate_null_is_empty_object() {
        let schema = ReindexDocumentsTool.parameters_schema();
        assert_eq!(validate_params(&schema, &Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn test_optional_u64() {
        assert_eq!(optional_u64(&json!({}), "n").unwrap(), None);
        assert_eq!(optional_u64(&json!({ "n": 3 }), "n").unwrap(), Some(3));
        assert!(optional_u64(&json!({ "n": "three" }), "n").is_err());
        assert!(optional_u64(&json!({ "n": 0 }), "n").is_err());
    }
}
