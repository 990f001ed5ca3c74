//! HTTP surface tests: a real server on a free port, backed by in-memory
//! collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use drive_qa::server::serve;
use drive_qa::traits::{ToolContext, ToolRegistry, EMPTY_INDEX_MESSAGE};
use drive_qa_core::completion::{CompletionProvider, CompletionRequest, Role};
use drive_qa_core::embedding::EmbeddingProvider;
use drive_qa_core::service::{QaService, ServiceSettings};
use drive_qa_core::source::memory::InMemorySource;
use drive_qa_core::tokenizer::ApproxTokenizer;
use drive_qa_core::{QaError, Result};
use serde_json::{json, Value};

// ─── Fakes ──────────────────────────────────────────────────────────

const AXES: [&str; 3] = ["revenue", "holiday", "kubernetes"];

struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        AXES.len() + 1
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("FAIL") {
            return Err(QaError::EmbeddingFailed("rejected".into()));
        }
        let lower = text.to_lowercase();
        let mut v = vec![0.0; AXES.len() + 1];
        for (i, kw) in AXES.iter().enumerate() {
            if lower.contains(kw) {
                v[i] = 1.0;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[AXES.len()] = 1.0;
        }
        Ok(v)
    }
}

/// Answers intent prompts with JSON, grounded prompts with a fixed
/// sentence, and anything else with "4".
struct ScriptedCompleter;

#[async_trait]
impl CompletionProvider for ScriptedCompleter {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let system = &request.messages[0];
        assert_eq!(system.role, Role::System);
        let user = &request.messages[request.messages.len() - 1].content;

        if system.content.contains("intent classifier") {
            let query = user
                .split("User query: \"")
                .nth(1)
                .and_then(|rest| rest.split('"').next())
                .unwrap_or_default();
            let intent = if query.contains("create a") {
                "create_document"
            } else if query.contains("my documents") {
                "document_search"
            } else {
                "general_knowledge"
            };
            return Ok(format!(
                "```json\n{{\"intent\": \"{}\", \"confidence\": 0.9, \"reasoning\": \"test\"}}\n```",
                intent
            ));
        }
        if user.contains("following documents") {
            return Ok("Q3 revenue was $5M.".to_string());
        }
        Ok("4".to_string())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

struct TestServer {
    base: String,
    source: Arc<InMemorySource>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server() -> TestServer {
    let source = Arc::new(
        InMemorySource::new()
            .with_doc("d1", "Budget", "Q3 revenue was $5M")
            .with_doc("d2", "Holidays", "The holiday schedule for December")
            .with_failing_doc("d3", "Broken")
            .with_file("f1", "scan.pdf", "application/pdf"),
    );
    let service = Arc::new(QaService::new(
        source.clone(),
        Arc::new(KeywordEmbedder),
        Arc::new(ScriptedCompleter),
        Arc::new(ApproxTokenizer),
        ServiceSettings::default(),
    ));
    let ctx = ToolContext::new(service, Arc::new(ScriptedCompleter));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        serve(listener, Arc::new(ToolRegistry::with_builtins()), ctx)
            .await
            .ok();
    });

    wait_for_server(port).await;
    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        source,
        handle,
    }
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn call(server: &TestServer, tool: &str, params: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/{}", server.base, tool))
        .json(&params)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_tool_list() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(health["documents"], 0);

    let list: Value = client
        .get(format!("{}/tools/list", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = list["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    for expected in [
        "list_files",
        "read_document",
        "create_document",
        "search_documents",
        "ask_question",
        "reindex_documents",
        "route_query",
    ] {
        assert!(names.contains(&expected), "missing {}: {:?}", expected, names);
    }
}

#[tokio::test]
async fn test_empty_index_search_and_ask() {
    let server = start_server().await;

    let (status, body) = call(&server, "search_documents", json!({ "query": "revenue" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["message"], EMPTY_INDEX_MESSAGE);
    assert_eq!(body["result"]["results"], json!([]));

    let (status, body) = call(&server, "search_documents", json!({ "query": "  " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = call(&server, "ask_question", json!({ "question": "What is 2+2?" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["answer"], "4");
    assert_eq!(body["result"]["grounded"], false);
    assert_eq!(body["result"]["fallback"], "empty_index");
}

#[tokio::test]
async fn test_reindex_then_grounded_answer() {
    let server = start_server().await;

    let (status, body) = call(&server, "reindex_documents", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["count"], 2);
    assert_eq!(body["result"]["generation"], 1);
    assert_eq!(body["result"]["skipped"][0]["id"], "d3");

    let (status, body) = call(
        &server,
        "ask_question",
        json!({ "question": "What was revenue in Q3?" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["answer"], "Q3 revenue was $5M.");
    assert_eq!(body["result"]["grounded"], true);
    assert_eq!(body["result"]["sources"], json!(["Budget"]));

    let (status, body) = call(
        &server,
        "ask_question",
        json!({ "question": "What was revenue in Q3?", "use_documents": false }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["grounded"], false);
    assert_eq!(body["result"]["fallback"], "documents_disabled");

    let index: Value = reqwest::get(format!("{}/index", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(index["count"], 2);
    assert_eq!(index["generation"], 1);
    assert_eq!(index["rebuilding"], false);
    assert_eq!(index["documents"][0]["dims"], 4);
}

#[tokio::test]
async fn test_search_results_carry_preview() {
    let server = start_server().await;
    call(&server, "reindex_documents", json!({})).await;

    let (status, body) = call(
        &server,
        "search_documents",
        json!({ "query": "holiday plans", "max_results": 1 }),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body["result"]["message"].is_null());
    let results = body["result"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "d2");
    assert_eq!(results[0]["name"], "Holidays");
    assert_eq!(results[0]["preview"], "The holiday schedule for December");
    assert!(results[0]["score"].as_f64().unwrap() > 0.99);
}

#[tokio::test]
async fn test_document_passthrough_tools() {
    let server = start_server().await;

    let (status, body) = call(
        &server,
        "list_files",
        json!({ "mime_type": "application/pdf" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["files"][0]["id"], "f1");
    assert_eq!(body["result"]["files"].as_array().unwrap().len(), 1);

    let (status, body) = call(&server, "read_document", json!({ "file_id": "d1" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["content"], "Q3 revenue was $5M");

    let (status, body) = call(
        &server,
        "create_document",
        json!({ "title": "Notes", "content": "hello" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["title"], "Notes");
    assert!(body["result"]["url"].as_str().unwrap().starts_with("memory://"));
}

#[tokio::test]
async fn test_error_contract() {
    let server = start_server().await;

    let (status, body) = call(&server, "nonexistent", json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = call(&server, "ask_question", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = call(&server, "ask_question", json!({ "question": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = call(&server, "read_document", json!({ "file_id": "missing" })).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    server.source.set_listing_down(true);
    let (status, body) = call(&server, "reindex_documents", json!({})).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "upstream_error");
}

#[tokio::test]
async fn test_route_query_dispatches_by_intent() {
    let server = start_server().await;
    call(&server, "reindex_documents", json!({})).await;

    let (status, body) = call(
        &server,
        "route_query",
        json!({ "query": "what do my documents say about revenue" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["intent"]["intent"], "document_search");
    assert_eq!(body["result"]["result"]["grounded"], true);

    let (status, body) = call(
        &server,
        "route_query",
        json!({ "query": "please create a holiday checklist" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["intent"]["intent"], "create_document");
    assert_eq!(
        body["result"]["result"]["title"],
        "Document for: please create a holiday checklist"
    );

    let (status, body) = call(&server, "route_query", json!({ "query": "what is 2+2" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["intent"]["intent"], "general_knowledge");
    assert_eq!(body["result"]["result"]["answer"], "4");
}
