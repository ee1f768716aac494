//! Development stub backend. Serves the same wire format as the real
//! modernization console backend so the client and CLI can be exercised end
//! to end; tool results and AI answers are canned.

use crate::protocol::{
    FileQueryRequest, HealthStatus, QueryRequest, ToolDefinition, ToolExecutionResponse,
    ToolInvocationRequest,
};
use axum::Json;
use axum::extract::{Multipart, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

pub struct ServerConfig {
    pub listen: String,
    pub token: String,
}

struct ServerState {
    token: String,
}

type ServerResult<T> = Result<T, Box<dyn Error + Send + Sync>>;
type ApiError = (StatusCode, Json<serde_json::Value>);

pub async fn run(config: ServerConfig) -> ServerResult<()> {
    let app = router(&config.token);
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    println!("modport stub backend listening on http://{}", config.listen);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Router construction is separate from `run` so tests can bind ephemeral
/// ports.
pub fn router(token: &str) -> axum::Router {
    let state = Arc::new(ServerState {
        token: token.to_string(),
    });
    axum::Router::new()
        .route("/api/agent/query", post(query_post).get(query_get))
        .route("/api/agent/query/file", post(query_file))
        .route("/api/agent/query/upload", post(query_upload))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/execute", post(execute_tool))
        .route("/api/health", get(health))
        .with_state(state)
}

async fn query_post(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(payload): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, &state.token)?;
    let query = non_empty_query(&payload.query)?;
    Ok(stream_response(answer_frames(&query, None)))
}

async fn query_get(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, &state.token)?;
    let query = non_empty_query(params.get("query").map(String::as_str).unwrap_or(""))?;
    Ok(stream_response(answer_frames(&query, None)))
}

async fn query_file(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(payload): Json<FileQueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, &state.token)?;
    let query = non_empty_query(&payload.query)?;
    let bytes = payload.file_data.decode().map_err(|err| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": format!("file_data.content is not valid base64: {err}") })),
        )
    })?;
    let summary = FileSummary {
        filename: payload.file_data.filename,
        size: bytes.len(),
    };
    Ok(stream_response(answer_frames(&query, Some(summary))))
}

async fn query_upload(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&headers, &state.token)?;

    let mut query = String::new();
    let mut summary: Option<FileSummary> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_detail)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("query") => {
                query = field.text().await.map_err(multipart_detail)?;
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_detail)?;
                summary = Some(FileSummary {
                    filename,
                    size: bytes.len(),
                });
            }
            _ => {}
        }
    }

    let query = non_empty_query(&query)?;
    let summary = summary.ok_or_else(|| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": "multipart field 'file' is required" })),
        )
    })?;
    Ok(stream_response(answer_frames(&query, Some(summary))))
}

async fn list_tools(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ToolDefinition>>, ApiError> {
    authorize(&headers, &state.token)?;
    Ok(Json(catalog()))
}

async fn execute_tool(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(payload): Json<ToolInvocationRequest>,
) -> Result<Json<ToolExecutionResponse>, ApiError> {
    authorize(&headers, &state.token)?;

    let response = match payload.tool_name.as_str() {
        "application_status" => ToolExecutionResponse {
            success: true,
            result: Some(json!({
                "application": payload.parameters.get("application").cloned(),
                "status": "in_migration",
                "completion": 62,
            })),
            error: None,
            execution_time: Some(0.012),
        },
        "subtask_progress" => ToolExecutionResponse {
            success: true,
            result: Some(json!({
                "open": 4,
                "blocked": 1,
                "done": 11,
            })),
            error: None,
            execution_time: Some(0.008),
        },
        "audit_history" => ToolExecutionResponse {
            success: true,
            result: Some(json!([
                { "at": "2025-11-03T10:14:00Z", "action": "status_changed", "by": "pm" },
                { "at": "2025-11-01T16:40:00Z", "action": "subtask_closed", "by": "dev" },
            ])),
            error: None,
            execution_time: Some(0.021),
        },
        "generate_report" => ToolExecutionResponse {
            success: true,
            result: Some(json!({ "report_id": Uuid::new_v4().to_string() })),
            error: None,
            execution_time: Some(0.145),
        },
        other => ToolExecutionResponse {
            success: false,
            result: None,
            error: Some(format!("unknown tool: {other}")),
            execution_time: None,
        },
    };

    Ok(Json(response))
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    })
}

struct FileSummary {
    filename: String,
    size: usize,
}

fn stream_response(frames: Vec<Event>) -> impl IntoResponse {
    let stream = tokio_stream::iter(frames.into_iter().map(Ok::<Event, Infallible>));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn answer_frames(query: &str, file: Option<FileSummary>) -> Vec<Event> {
    let mut frames = vec![
        frame(
            "status",
            &json!({ "phase": "analyzing", "message": "analyzing query" }),
        ),
        frame(
            "data",
            &json!({
                "request_id": Uuid::new_v4().to_string(),
                "query": query,
                "file": file.as_ref().map(|f| json!({
                    "filename": f.filename,
                    "size": f.size,
                })),
            }),
        ),
    ];

    let answer = match &file {
        Some(f) => format!(
            "Received {} ({} bytes). Against \"{}\": 3 of 5 tracked applications are mid-migration; no blocked subtasks reference this file.",
            f.filename, f.size, query
        ),
        None => format!(
            "Against \"{}\": 3 of 5 tracked applications are mid-migration, one is blocked on a schema review, and the audit trail shows no changes in the last 24 hours.",
            query
        ),
    };
    for word in answer.split_inclusive(' ') {
        frames.push(frame("ai_chunk", &json!({ "content": word })));
    }

    frames.push(frame(
        "done",
        &json!({ "success": true, "message": "completed" }),
    ));
    frames
}

fn frame(event: &str, payload: &serde_json::Value) -> Event {
    Event::default().event(event).data(payload.to_string())
}

fn multipart_detail(err: axum::extract::multipart::MultipartError) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "detail": format!("malformed multipart body: {err}") })),
    )
}

fn non_empty_query(query: &str) -> Result<String, ApiError> {
    let query = query.trim();
    if query.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": [{ "loc": ["body", "query"], "msg": "query must not be empty" }] })),
        ));
    }
    Ok(query.to_string())
}

fn authorize(headers: &HeaderMap, token: &str) -> Result<(), ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match header {
        Some(value) if value == format!("Bearer {}", token) => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "invalid or missing bearer token" })),
        )),
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ApplicationStatusParams {
    #[schemars(description = "Name of the tracked application.")]
    application: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SubtaskProgressParams {
    #[schemars(description = "Name of the tracked application.")]
    application: String,
    #[schemars(description = "Optional subtask category filter.")]
    #[serde(default)]
    category: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct AuditHistoryParams {
    #[schemars(description = "Name of the tracked application.")]
    application: String,
    #[schemars(description = "Maximum number of audit entries to return.")]
    #[serde(default)]
    limit: u32,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct GenerateReportParams {
    #[schemars(description = "Report format, e.g. xlsx or csv.")]
    format: String,
}

fn catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "application_status".to_string(),
            description: "Current transformation status of one application.".to_string(),
            category: "query".to_string(),
            requires_edit: false,
            parameters: serde_json::to_value(schema_for!(ApplicationStatusParams)).ok(),
        },
        ToolDefinition {
            name: "subtask_progress".to_string(),
            description: "Open, blocked, and completed subtask counts.".to_string(),
            category: "query".to_string(),
            requires_edit: false,
            parameters: serde_json::to_value(schema_for!(SubtaskProgressParams)).ok(),
        },
        ToolDefinition {
            name: "audit_history".to_string(),
            description: "Recent audit trail entries for an application.".to_string(),
            category: "query".to_string(),
            requires_edit: false,
            parameters: serde_json::to_value(schema_for!(AuditHistoryParams)).ok(),
        },
        ToolDefinition {
            name: "generate_report".to_string(),
            description: "Generate a progress report across all applications.".to_string(),
            category: "report".to_string(),
            requires_edit: true,
            parameters: serde_json::to_value(schema_for!(GenerateReportParams)).ok(),
        },
    ]
}
