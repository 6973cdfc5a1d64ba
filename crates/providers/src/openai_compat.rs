//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, DeepSeek, OpenRouter, Ollama, vLLM, one-api/new-api
//! relays and any other endpoint exposing `/chat/completions` and
//! `/embeddings`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Multi-part user turns with image URLs
//! - Capability-hint extra body fields
//! - Embeddings

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parley_core::error::ProviderError;
use parley_core::provider::*;
use serde::Deserialize;
use tracing::{debug, trace, warn};

/// Shared HTTP client settings. Per-attempt deadlines are enforced by the
/// caller, so only connecting is bounded here.
pub(crate) fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_default()
}

/// An OpenAI-compatible completion provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider with its own HTTP client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_client(name, base_url, api_key, default_client())
    }

    /// Create a provider that reuses an existing HTTP client.
    pub fn with_client(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Request body for `/chat/completions`.
    fn build_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if let (Some(hint), Some(obj)) = (&request.capability, body.as_object_mut()) {
            obj.extend(hint.extra_body());
        }

        body
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept_sse: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if accept_sse {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        check_status(&self.name, response).await
    }
}

/// Map non-success statuses onto provider errors.
async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if (200..300).contains(&status) {
        return Ok(response);
    }

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    let error_body = response.text().await.unwrap_or_default();
    warn!(provider = %provider, status, body = %error_body, "Provider returned error");
    Err(ProviderError::ApiError {
        status_code: status,
        message: error_body,
    })
}

#[async_trait]
impl parley_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = Self::build_body(&request, false);
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.post("/chat/completions", &body, false).await?;

        let status = response.status().as_u16();
        let api_response: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
        })?;

        if let Some(error) = &api_response.error {
            return Err(upstream_error(error, status));
        }

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        Ok(ProviderResponse {
            content: choice.message.content.or(choice.text).unwrap_or_default(),
            usage: api_response.usage.map(Usage::from),
            model: api_response.model.unwrap_or(request.model),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        let body = Self::build_body(&request, true);
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post("/chat/completions", &body, true).await?;
        let status = response.status().as_u16();

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut usage: Option<Usage> = None;
            let mut frames = 0usize;

            loop {
                // Dropping the response aborts the HTTP request
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!(
                            provider = %provider_name,
                            "Stream receiver dropped, aborting request"
                        );
                        return;
                    }
                    next = byte_stream.next() => next,
                };

                let bytes = match next {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                    None => break,
                };

                buffer.extend_from_slice(&bytes);

                // Process complete lines; a multi-byte char may straddle chunks
                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw);

                    match parse_sse_line(line.trim_end_matches(['\r', '\n'])) {
                        SseLine::Skip => {}
                        SseLine::Done => {
                            let _ = tx.send(finish(frames, usage)).await;
                            return;
                        }
                        SseLine::Invalid { data, error } => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %error,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                        SseLine::Data(stream_resp) => {
                            if let Some(error) = &stream_resp.error {
                                let err = upstream_error(error, status);
                                warn!(
                                    provider = %provider_name,
                                    error = %err,
                                    "Error frame in stream"
                                );
                                let _ = tx.send(Err(err)).await;
                                return;
                            }
                            frames += 1;

                            if let Some(content) = stream_resp.text() {
                                let chunk = StreamChunk {
                                    content: Some(content),
                                    done: false,
                                    usage: None,
                                };
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }

                            // Usage may ride on any chunk; the last one wins
                            if let Some(u) = stream_resp.usage {
                                usage = Some(u.into());
                            }
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(finish(frames, usage)).await;
        });

        Ok(rx)
    }
}

/// An OpenAI-compatible embedding backend.
pub struct OpenAiCompatEmbedder {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            name: format!("embeddings/{model}"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
            client: default_client(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "encoding_format": "float",
        });

        debug!(model = %self.model, chars = text.chars().count(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = check_status(&self.name, response).await?;

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("Empty embedding response".into()))
    }
}

/// The closing chunk, or an error when the body carried no data frames.
fn finish(frames: usize, usage: Option<Usage>) -> Result<StreamChunk, ProviderError> {
    if frames == 0 {
        return Err(ProviderError::InvalidResponse(
            "Stream ended without any data frames".into(),
        ));
    }
    Ok(StreamChunk {
        content: None,
        done: true,
        usage,
    })
}

/// Map an in-band `{"error": ...}` object to a provider error.
///
/// Relays use `{"message", "code"}` objects or bare strings.
fn upstream_error(error: &serde_json::Value, http_status: u16) -> ProviderError {
    let message = match error {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    let status_code = error
        .get("code")
        .and_then(|c| c.as_u64())
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(http_status);
    ProviderError::ApiError {
        status_code,
        message,
    }
}

// --- SSE line parsing ---

enum SseLine {
    /// Blank lines, comments and non-data fields
    Skip,
    Done,
    Data(StreamResponse),
    Invalid { data: String, error: String },
}

fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => SseLine::Data(resp),
        Err(e) => SseLine::Invalid {
            data: data.to_string(),
            error: e.to_string(),
        },
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    message: ApiMessage,
    /// Legacy completions shape
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl StreamResponse {
    /// Text of the first choice. Relays differ in where they put it:
    /// `delta.content`, `delta.text`, `text` or a full `message`.
    fn text(&self) -> Option<String> {
        let choice = self.choices.first()?;
        [
            choice.delta.content.as_ref(),
            choice.delta.text.as_ref(),
            choice.text.as_ref(),
            choice.message.as_ref().and_then(|m| m.content.as_ref()),
        ]
        .into_iter()
        .flatten()
        .find(|t| !t.is_empty())
        .cloned()
    }
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<ApiMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ChatTurn, Provider};

    fn request(model: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.into(),
            messages: vec![ChatTurn::system("be brief"), ChatTurn::user("hi")],
            max_tokens: Some(16000),
            stream: true,
            capability: crate::capability::detect(model),
        }
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let provider = OpenAiCompatProvider::new("ds", "https://api.deepseek.com/v1/", "k");
        assert_eq!(provider.name(), "ds");
        assert_eq!(provider.base_url, "https://api.deepseek.com/v1");
    }

    #[test]
    fn body_for_plain_model() {
        let body = OpenAiCompatProvider::build_body(&request("gpt-4o"), false);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 16000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("stream_options").is_none());
        assert!(body.get("thinking").is_none());
    }

    #[test]
    fn body_merges_capability_hint() {
        let body = OpenAiCompatProvider::build_body(&request("claude-sonnet-thinking"), true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["thinking"]["type"], "enabled");
        assert_eq!(body["thinking"]["budget_tokens"], 10000);
    }

    #[test]
    fn body_keeps_multipart_turns() {
        let mut req = request("gpt-4o");
        req.messages
            .push(ChatTurn::user_with_images("what is this", &["https://img/1.png".into()]));
        let body = OpenAiCompatProvider::build_body(&req, true);
        assert_eq!(body["messages"][2]["content"][0]["type"], "text");
        assert_eq!(
            body["messages"][2]["content"][1]["image_url"]["url"],
            "https://img/1.png"
        );
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let SseLine::Data(resp) = parse_sse_line(line) else {
            panic!("expected data");
        };
        assert_eq!(resp.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_done_and_skips() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line("data:[DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
        assert!(matches!(parse_sse_line(": ping"), SseLine::Skip));
        assert!(matches!(parse_sse_line("event: message"), SseLine::Skip));
        assert!(matches!(parse_sse_line("data: {oops"), SseLine::Invalid { .. }));
    }

    #[test]
    fn parse_usage_only_chunk() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let SseLine::Data(resp) = parse_sse_line(line) else {
            panic!("expected data");
        };
        let usage: Usage = resp.usage.unwrap().into();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
    }

    #[test]
    fn parse_chunk_without_delta() {
        let line = r#"data: {"choices":[{"finish_reason":"stop"}]}"#;
        let SseLine::Data(resp) = parse_sse_line(line) else {
            panic!("expected data");
        };
        assert!(resp.choices[0].delta.content.is_none());
    }

    #[test]
    fn parse_completion_with_null_content() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.model.is_none());
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    // --- against a local endpoint ---

    async fn serve(status: u16, content_type: &'static str, body: &'static str) -> String {
        use axum::http::{StatusCode, header};
        use axum::routing::post;

        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(move || async move {
                (
                    StatusCode::from_u16(status).unwrap(),
                    [(header::CONTENT_TYPE, content_type)],
                    body,
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn streams_chunks_and_trailing_usage() {
        let base = serve(
            200,
            "text/event-stream",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
             data: {\"choices\":[],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":2,\"total_tokens\":9}}\n\n\
             data: [DONE]\n\n",
        )
        .await;

        let provider = OpenAiCompatProvider::new("local", base, "k");
        let mut rx = provider.stream(request("m")).await.unwrap();

        let mut text = String::new();
        let mut usage = None;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            if let Some(c) = chunk.content {
                text.push_str(&c);
            }
            if chunk.done {
                usage = chunk.usage;
            }
        }
        assert_eq!(text, "Hello");
        assert_eq!(usage.unwrap().prompt_tokens, 7);
    }

    #[tokio::test]
    async fn complete_reads_usage() {
        let base = serve(
            200,
            "application/json",
            r#"{"model":"m-1","choices":[{"message":{"content":"hey"}}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        )
        .await;

        let provider = OpenAiCompatProvider::new("local", base, "k");
        let response = provider.complete(request("m")).await.unwrap();
        assert_eq!(response.content, "hey");
        assert_eq!(response.model, "m-1");
        assert_eq!(response.usage.unwrap().total_tokens, 4);
    }

    #[tokio::test]
    async fn error_status_maps_to_provider_error() {
        let base = serve(502, "text/plain", "bad gateway").await;
        let provider = OpenAiCompatProvider::new("local", base, "k");
        let err = provider.stream(request("m")).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 502, .. }));

        let base = serve(401, "text/plain", "nope").await;
        let provider = OpenAiCompatProvider::new("local", base, "k");
        let err = provider.complete(request("m")).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    async fn collect(provider: &OpenAiCompatProvider) -> Vec<Result<StreamChunk, ProviderError>> {
        let mut rx = provider.stream(request("m")).await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn error_frame_in_stream_is_an_error() {
        let base = serve(
            200,
            "text/event-stream",
            "data: {\"error\":{\"message\":\"quota exceeded\",\"type\":\"insufficient_quota\"}}\n\n",
        )
        .await;
        let provider = OpenAiCompatProvider::new("local", base, "k");

        let chunks = collect(&provider).await;
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            Err(ProviderError::ApiError { status_code, message }) => {
                assert_eq!(*status_code, 200);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_frame_after_content_stops_the_stream() {
        let base = serve(
            200,
            "text/event-stream",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
             data: {\"error\":{\"message\":\"overloaded\",\"code\":529}}\n\n\
             data: [DONE]\n\n",
        )
        .await;
        let provider = OpenAiCompatProvider::new("local", base, "k");

        let chunks = collect(&provider).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().content.as_deref(), Some("Hel"));
        assert!(matches!(
            chunks[1],
            Err(ProviderError::ApiError { status_code: 529, .. })
        ));
    }

    #[tokio::test]
    async fn stream_without_data_frames_is_an_error() {
        for body in ["data: [DONE]\n\n", ": keep-alive\n\n", "data: {oops\n\n"] {
            let base = serve(200, "text/event-stream", body).await;
            let provider = OpenAiCompatProvider::new("local", base, "k");

            let chunks = collect(&provider).await;
            assert_eq!(chunks.len(), 1, "body {body:?}");
            assert!(
                matches!(chunks[0], Err(ProviderError::InvalidResponse(_))),
                "body {body:?}"
            );
        }
    }

    #[tokio::test]
    async fn stream_reads_relay_text_fields() {
        let base = serve(
            200,
            "text/event-stream",
            "data: {\"choices\":[{\"delta\":{\"text\":\"a\"}}]}\n\n\
             data: {\"choices\":[{\"text\":\"b\"}]}\n\n\
             data: {\"choices\":[{\"message\":{\"content\":\"c\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"d\",\"text\":\"x\"}}]}\n\n\
             data: [DONE]\n\n",
        )
        .await;
        let provider = OpenAiCompatProvider::new("local", base, "k");

        let text: String = collect(&provider)
            .await
            .into_iter()
            .filter_map(|c| c.unwrap().content)
            .collect();
        assert_eq!(text, "abcd");
    }

    #[tokio::test]
    async fn complete_surfaces_error_body() {
        let base = serve(
            200,
            "application/json",
            r#"{"error":{"message":"model overloaded"}}"#,
        )
        .await;
        let provider = OpenAiCompatProvider::new("local", base, "k");
        let err = provider.complete(request("m")).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::ApiError { ref message, .. } if message == "model overloaded"
        ));
    }
}
