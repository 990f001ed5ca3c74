//! HTTP server: REST tool API plus the MCP endpoint.
//!
//! Every operation is a registered [`Tool`](crate::traits::Tool) dispatched
//! through the same `POST /tools/{name}` handler. The MCP bridge at `/mcp`
//! serves the same registry over JSON-RPC.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Status, version, and indexed document count |
//! | `GET`  | `/index` | Index generation and per-document summary |
//! | `*`    | `/mcp` | MCP Streamable HTTP transport |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `rebuild_in_progress` | 409 |
//! | `context_too_large` | 413 |
//! | `upstream_error` | 502 |
//! | `tool_error` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use drive_qa_core::service::IndexStatus;
use drive_qa_core::QaError;

use crate::config::Config;
use crate::mcp::McpBridge;
use crate::traits::{validate_params, ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
}

/// Build providers from `config` and serve until the process is stopped.
///
/// With `reindex`, the index is built before the listener opens. A failed
/// startup rebuild is logged and the server starts with an empty index.
pub async fn run_server(config: &Config, reindex: bool) -> anyhow::Result<()> {
    let (service, completer) = crate::service::build_service(config)?;
    let ctx = ToolContext::new(service, completer);

    if reindex {
        match ctx.service().rebuild_index().await {
            Ok(report) => info!(
                count = report.count,
                skipped = report.skipped.len(),
                "startup index built"
            ),
            Err(e) => warn!(error = %e, "startup index build failed"),
        }
    }

    let listener = TcpListener::bind(&config.server.bind).await?;
    serve(listener, Arc::new(ToolRegistry::with_builtins()), ctx).await
}

/// Serve `tools` on an already-bound listener.
///
/// Used by [`run_server`] and by tests that inject fake collaborators.
pub async fn serve(
    listener: TcpListener,
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
) -> anyhow::Result<()> {
    for t in tools.tools() {
        info!(tool = t.name(), read_only = t.is_read_only(), "registered tool");
    }
    let addr = listener.local_addr()?;
    let app = router(tools, ctx);

    info!(%addr, "drive-qa server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// The full route table.
pub fn router(tools: Arc<ToolRegistry>, ctx: ToolContext) -> Router {
    let bridge = McpBridge::new(tools.clone(), ctx.clone());
    let mcp = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .route("/index", get(handle_index))
        .nest_service("/mcp", mcp)
        .layer(cors)
        .with_state(AppState { tools, ctx })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<&QaError> for AppError {
    fn from(err: &QaError) -> Self {
        let (status, code) = match err {
            QaError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            QaError::DocumentUnavailable { .. } => (StatusCode::NOT_FOUND, "not_found"),
            QaError::ContextTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "context_too_large"),
            QaError::RebuildInProgress => (StatusCode::CONFLICT, "rebuild_in_progress"),
            QaError::SourceUnavailable(_)
            | QaError::EmbeddingFailed(_)
            | QaError::CompletionFailed(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "tool_error"),
        };
        AppError::new(status, code, err.to_string())
    }
}

/// Map a tool failure to a response, keeping the [`QaError`] mapping
/// when one is anywhere in the error chain.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let mut app_err = match err.chain().find_map(|e| e.downcast_ref::<QaError>()) {
        Some(qa) => AppError::from(qa),
        None => AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "tool_error",
            format!("{:#}", err),
        ),
    };
    app_err.message = format!("{}: {}", tool_name, app_err.message);
    app_err
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Records in the current index generation.
    documents: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        documents: state.ctx.service().index().len(),
    })
}

// ============ GET /index ============

async fn handle_index(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.ctx.service().index_status())
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    builtin: bool,
    read_only: bool,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            builtin: t.is_builtin(),
            read_only: t.is_read_only(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Unified tool dispatch: find the tool, validate parameters, execute,
/// and wrap the output as `{ "result": ... }`.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state.tools.find(&name).ok_or_else(|| {
        AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no tool registered with name: {}", name),
        )
    })?;

    let params = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| classify_tool_error(&name, e))?;

    let started = Instant::now();
    let result = tool.execute(params, &state.ctx).await;
    let latency_ms = started.elapsed().as_millis();

    match result {
        Ok(result) => {
            info!(tool = %name, latency_ms, "tool call finished");
            Ok(Json(serde_json::json!({ "result": result })))
        }
        Err(e) => {
            let app_err = classify_tool_error(&name, e);
            warn!(
                tool = %name,
                status = app_err.status.as_u16(),
                code = app_err.code,
                latency_ms,
                "tool call failed"
            );
            Err(app_err)
        }
    }
}
