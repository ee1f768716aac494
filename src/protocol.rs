use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// One logical unit of the streaming wire format: an event tag plus a
/// JSON-encoded data payload. Produced transiently by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Transport(String),
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkPayload {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DonePayload {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ErrorPayload {
    pub fn into_message(self) -> String {
        self.error
            .or(self.message)
            .unwrap_or_else(|| "unknown stream error".to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolExecutionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub category: String,
    pub requires_edit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// File content held client-side before an upload strategy turns it into a
/// request body. Reading the file is the only fallible step and happens
/// before any network I/O.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub async fn read(path: &Path) -> Result<Self, AgentError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AgentError::FileRead {
                path: path.display().to_string(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self {
            content_type: guess_content_type(&filename).to_string(),
            filename,
            bytes,
        })
    }

    pub fn from_bytes(filename: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: guess_content_type(filename).to_string(),
            bytes,
        }
    }

    pub fn to_file_data(&self) -> FileData {
        FileData {
            filename: self.filename.clone(),
            content: BASE64.encode(&self.bytes),
            content_type: self.content_type.clone(),
            size: self.bytes.len() as u64,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileData {
    pub filename: String,
    pub content: String,
    pub content_type: String,
    pub size: u64,
}

impl FileData {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.content)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileQueryRequest {
    pub query: String,
    pub file_data: FileData,
}

fn guess_content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_ascii_lowercase) {
        Some(ext) => match ext.as_str() {
            "json" => "application/json",
            "csv" => "text/csv",
            "txt" | "log" => "text/plain",
            "md" => "text/markdown",
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "pdf" => "application/pdf",
            _ => "application/octet-stream",
        },
        None => "application/octet-stream",
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Text(String),
    Items(Vec<ValidationItem>),
}

#[derive(Debug, Deserialize)]
struct ValidationItem {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

/// Best-effort human-readable message from a backend error response.
/// Looks for `detail` (string or validation array) then `message`, falling
/// back to the HTTP status line.
pub fn extract_error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        match parsed.detail {
            Some(ErrorDetail::Text(text)) if !text.is_empty() => return text,
            Some(ErrorDetail::Items(items)) if !items.is_empty() => {
                return items
                    .iter()
                    .map(|item| {
                        let loc = item
                            .loc
                            .iter()
                            .map(|part| match part {
                                serde_json::Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join(".");
                        format!("{} - {}", loc, item.msg)
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
            }
            _ => {}
        }
        if let Some(message) = parsed.message {
            if !message.is_empty() {
                return message;
            }
        }
    }

    format!(
        "{}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("request failed")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn extract_prefers_string_detail() {
        let msg = extract_error_message(StatusCode::FORBIDDEN, r#"{"detail":"forbidden"}"#);
        assert_eq!(msg, "forbidden");
    }

    #[test]
    fn extract_flattens_validation_items() {
        let body = r#"{"detail":[
            {"loc":["body","query"],"msg":"field required"},
            {"loc":["body","context",0],"msg":"invalid type"}
        ]}"#;
        let msg = extract_error_message(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(
            msg,
            "body.query - field required; body.context.0 - invalid type"
        );
    }

    #[test]
    fn extract_falls_back_to_message_field() {
        let msg = extract_error_message(StatusCode::BAD_GATEWAY, r#"{"message":"upstream down"}"#);
        assert_eq!(msg, "upstream down");
    }

    #[test]
    fn extract_falls_back_to_status_line() {
        let msg = extract_error_message(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert_eq!(msg, "500: Internal Server Error");
    }

    #[test]
    fn file_data_round_trips_small_payload() {
        let bytes = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let payload = FilePayload::from_bytes("dump.bin", bytes.clone());
        let data = payload.to_file_data();
        assert_eq!(data.size, 10);
        assert_eq!(data.decode().unwrap(), bytes);
    }

    #[test]
    fn content_type_guessed_from_extension() {
        assert_eq!(
            FilePayload::from_bytes("report.csv", Vec::new()).content_type,
            "text/csv"
        );
        assert_eq!(
            FilePayload::from_bytes("blob", Vec::new()).content_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn error_payload_prefers_error_over_message() {
        let payload = ErrorPayload {
            error: Some("tool failed".to_string()),
            message: Some("ignored".to_string()),
        };
        assert_eq!(payload.into_message(), "tool failed");
    }
}
