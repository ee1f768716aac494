use crate::config::ClientConfig;
use crate::decoder::FrameDecoder;
use crate::dispatch::{StreamCallbacks, dispatch};
use crate::protocol::{
    AgentError, FilePayload, HealthStatus, QueryRequest, ToolDefinition, ToolExecutionResponse,
    ToolInvocationRequest, extract_error_message,
};
use futures::StreamExt;
use reqwest::Client as HttpClient;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMethod {
    Get,
    #[default]
    Post,
}

/// Per-call state, exclusively owned by the invocation that created it.
/// `settle` is a check-and-set guard so the terminal outcome fires at most
/// once even if the server sends several terminal frames or the connection
/// drops mid-frame.
struct StreamSession {
    decoder: FrameDecoder,
    settled: bool,
}

impl StreamSession {
    fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(),
            settled: false,
        }
    }

    fn settle(&mut self) -> bool {
        if self.settled {
            return false;
        }
        self.settled = true;
        true
    }
}

/// Client for the modernization console's agent backend: streaming
/// natural-language queries, file uploads, and the non-streaming tool
/// catalog/execution endpoints.
#[derive(Clone)]
pub struct AgentClient {
    http: HttpClient,
    config: ClientConfig,
}

impl AgentClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: HttpClient::new(),
            config,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Streams a natural-language query, invoking `callbacks` per frame.
    /// Resolves once at natural end-of-stream even if no `done` frame was
    /// seen; an empty query fails before any network I/O.
    pub async fn query_stream(
        &self,
        query: &str,
        context: Option<serde_json::Value>,
        method: QueryMethod,
        callbacks: &mut StreamCallbacks,
    ) -> Result<(), AgentError> {
        let query = query.trim();
        if query.is_empty() {
            let message = "query must not be empty";
            callbacks.emit_error(message);
            return Err(AgentError::Validation(message.to_string()));
        }

        let url = format!("{}/api/agent/query", self.config.base_url);
        let request = match method {
            QueryMethod::Post => {
                let body = QueryRequest {
                    query: query.to_string(),
                    context,
                };
                self.http.post(&url).json(&body)
            }
            QueryMethod::Get => {
                let mut params = vec![("query".to_string(), query.to_string())];
                if let Some(context) = context {
                    params.push(("context".to_string(), context.to_string()));
                }
                self.http.get(&url).query(&params)
            }
        };

        self.run_stream(request, callbacks).await
    }

    /// Streams a file-plus-query request. The file is already in memory
    /// (`FilePayload::read` handles the fallible read); both strategies feed
    /// the same streamed-response loop as `query_stream`.
    pub async fn upload_file_with_query(
        &self,
        file: &FilePayload,
        query: &str,
        use_multipart: bool,
        callbacks: &mut StreamCallbacks,
    ) -> Result<(), AgentError> {
        let query = query.trim();
        if query.is_empty() {
            let message = "query must not be empty";
            callbacks.emit_error(message);
            return Err(AgentError::Validation(message.to_string()));
        }
        if file.bytes.is_empty() && file.filename.is_empty() {
            let message = "a file is required";
            callbacks.emit_error(message);
            return Err(AgentError::Validation(message.to_string()));
        }

        let strategy = if use_multipart {
            UploadStrategy::Multipart
        } else {
            UploadStrategy::JsonBase64
        };
        let request = match strategy.build(&self.http, &self.config.base_url, file, query) {
            Ok(request) => request,
            Err(err) => {
                callbacks.emit_error(&err.to_string());
                return Err(err);
            }
        };

        self.run_stream(request, callbacks).await
    }

    /// Reads `path` and uploads it with `query`. An unreadable file surfaces
    /// through `on_error` and rejects the call with no request attempted.
    pub async fn upload_path_with_query(
        &self,
        path: &std::path::Path,
        query: &str,
        use_multipart: bool,
        callbacks: &mut StreamCallbacks,
    ) -> Result<(), AgentError> {
        let file = match FilePayload::read(path).await {
            Ok(file) => file,
            Err(err) => {
                callbacks.emit_error(&err.to_string());
                return Err(err);
            }
        };
        self.upload_file_with_query(&file, query, use_multipart, callbacks)
            .await
    }

    /// Shared send-and-stream routine. Non-2xx responses surface a message
    /// extracted from the body without ever entering the frame loop.
    async fn run_stream(
        &self,
        request: reqwest::RequestBuilder,
        callbacks: &mut StreamCallbacks,
    ) -> Result<(), AgentError> {
        let mut session = StreamSession::new();

        let response = match request
            .header(AUTHORIZATION, self.config.authorization_value())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let message = format!("request failed: {err}");
                if session.settle() {
                    callbacks.emit_error(&message);
                }
                return Err(AgentError::Transport(message));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(status, &body);
            if session.settle() {
                callbacks.emit_error(&message);
            }
            return Err(AgentError::Transport(message));
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let message = format!("stream interrupted: {err}");
                    warn!(%err, "response stream failed mid-read");
                    if session.settle() {
                        callbacks.emit_error(&message);
                    }
                    return Err(AgentError::Transport(message));
                }
            };
            for frame in session.decoder.feed(&chunk) {
                dispatch(&frame, callbacks);
            }
        }

        // Natural end-of-stream is success even without an explicit done.
        session.settle();
        Ok(())
    }

    /// Executes one named backend tool and returns its result envelope.
    pub async fn execute_tool(
        &self,
        name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolExecutionResponse, AgentError> {
        let body = ToolInvocationRequest {
            tool_name: name.to_string(),
            parameters,
        };
        let request = self
            .http
            .post(format!("{}/api/tools/execute", self.config.base_url))
            .json(&body);
        self.send_json(request).await
    }

    /// Fetches the static tool catalog.
    pub async fn get_tools(&self) -> Result<Vec<ToolDefinition>, AgentError> {
        let request = self
            .http
            .get(format!("{}/api/tools", self.config.base_url));
        self.send_json(request).await
    }

    pub async fn health_check(&self) -> Result<HealthStatus, AgentError> {
        let request = self
            .http
            .get(format!("{}/api/health", self.config.base_url));
        self.send_json(request).await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AgentError> {
        let response = request
            .header(AUTHORIZATION, self.config.authorization_value())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Transport(extract_error_message(status, &body)));
        }

        Ok(response.json().await?)
    }
}

/// The two request shapes a file upload can take. Both arms produce a
/// request consumed by the one shared `run_stream` loop.
enum UploadStrategy {
    /// Form fields `file` and `query`; the transport owns the content-type
    /// header so the multipart boundary survives.
    Multipart,
    /// One JSON body carrying the file as base64 `file_data`.
    JsonBase64,
}

impl UploadStrategy {
    fn build(
        &self,
        http: &HttpClient,
        base_url: &str,
        file: &FilePayload,
        query: &str,
    ) -> Result<reqwest::RequestBuilder, AgentError> {
        match self {
            UploadStrategy::Multipart => {
                let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.filename.clone())
                    .mime_str(&file.content_type)
                    .map_err(|err| {
                        AgentError::Validation(format!(
                            "invalid content type {}: {err}",
                            file.content_type
                        ))
                    })?;
                let form = reqwest::multipart::Form::new()
                    .part("file", part)
                    .text("query", query.to_string());
                Ok(http
                    .post(format!("{base_url}/api/agent/query/upload"))
                    .multipart(form))
            }
            UploadStrategy::JsonBase64 => {
                let body = serde_json::json!({
                    "query": query,
                    "file_data": file.to_file_data(),
                });
                Ok(http
                    .post(format!("{base_url}/api/agent/query/file"))
                    .header(CONTENT_TYPE, "application/json")
                    .json(&body))
            }
        }
    }
}
