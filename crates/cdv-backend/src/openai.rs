//! OpenAI-compatible chat completion client with SSE streaming.
//!
//! The same client serves the hosted API and any local server that exposes
//! `/v1/chat/completions` (LM Studio, llama.cpp, Ollama's OpenAI shim).

use std::fmt::Display;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use cdv_protocol::{ChatMessage, ChatRequest, StreamEvent};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{BackendError, ChatBackend};
use crate::sse::SseDecoder;

pub const HOSTED_BASE_URL: &str = "https://api.openai.com/v1";

/// Local servers accept any bearer token but most reject a missing header.
const LOCAL_API_KEY: &str = "local";

const DONE_SENTINEL: &str = "[DONE]";

/// OpenAI-compatible API client.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

fn build_http_client() -> Result<Client, BackendError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(300))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(2)
        .build()?;
    Ok(client)
}

impl OpenAiClient {
    /// Client for the hosted API. Calls fail with `MissingApiKey` when no
    /// credential is configured.
    pub fn hosted(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            http: build_http_client()?,
        })
    }

    /// Client for a local server at `host:port`.
    pub fn local(host: &str, port: u16) -> Result<Self, BackendError> {
        Ok(Self {
            base_url: format!("http://{host}:{port}/v1"),
            api_key: Some(LOCAL_API_KEY.to_string()),
            http: build_http_client()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn post(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response, BackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(BackendError::MissingApiKey)?;

        let body = ApiRequest {
            model: &request.model,
            messages: &request.messages,
            stream,
        };

        tracing::debug!(
            endpoint = %self.endpoint(),
            model = %request.model,
            messages = request.messages.len(),
            stream,
            "sending completion request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(format!("{status}: {body}")));
        }

        Ok(response)
    }

    /// Send a non-streaming request and return the reply text.
    pub async fn send_non_streaming(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let response = self.post(request, false).await?;
        let body: CompletionResponse = response.json().await?;
        first_choice_text(body)
    }

    /// Send a streaming request and return the decoded events.
    pub fn send(&self, request: &ChatRequest) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let client = self.clone();
        let request = request.clone();

        stream! {
            match client.post(&request, true).await {
                Ok(response) => {
                    let mut events = std::pin::pin!(decode_stream(response.bytes_stream()));
                    while let Some(event) = events.next().await {
                        yield event;
                    }
                }
                Err(e) => {
                    yield StreamEvent::Error(e.to_string());
                }
            }
        }
    }
}

impl ChatBackend for OpenAiClient {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(self.send_non_streaming(request))
    }

    fn stream(&self, request: &ChatRequest) -> BoxStream<'static, StreamEvent> {
        self.send(request).boxed()
    }
}

/// Turn a raw SSE byte stream into `StreamEvent`s.
///
/// Always ends with exactly one `Done` or `Error`, even if the server closes
/// the connection without sending `[DONE]`.
pub fn decode_stream<S, E>(bytes: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    stream! {
        let mut bytes = std::pin::pin!(bytes);
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for data in decoder.push(&chunk) {
                        match parse_chunk(&data) {
                            Chunk::Text(text) => {
                                yield StreamEvent::TextDelta(text);
                            }
                            Chunk::Skip => {}
                            Chunk::Done => {
                                yield StreamEvent::Done;
                                return;
                            }
                            Chunk::Failed(message) => {
                                yield StreamEvent::Error(message);
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    yield StreamEvent::Error(format!("stream error: {e}"));
                    return;
                }
            }
        }

        if let Some(data) = decoder.finish() {
            match parse_chunk(&data) {
                Chunk::Text(text) => {
                    yield StreamEvent::TextDelta(text);
                }
                Chunk::Failed(message) => {
                    yield StreamEvent::Error(message);
                    return;
                }
                Chunk::Skip | Chunk::Done => {}
            }
        }

        yield StreamEvent::Done;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Text(String),
    Skip,
    Done,
    Failed(String),
}

/// Interpret one `data:` payload of a completion stream.
fn parse_chunk(data: &str) -> Chunk {
    if data.trim() == DONE_SENTINEL {
        return Chunk::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparsable stream chunk");
            return Chunk::Skip;
        }
    };

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Chunk::Failed(message);
    }

    let text: String = value
        .get("choices")
        .and_then(|c| c.as_array())
        .map(|choices| {
            choices
                .iter()
                .filter_map(|choice| choice.get("delta")?.get("content")?.as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        Chunk::Skip
    } else {
        Chunk::Text(text)
    }
}

fn first_choice_text(response: CompletionResponse) -> Result<String, BackendError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| BackendError::Api("no choices in response".to_string()))
}

// API request/response types

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(chunks: Vec<String>) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from(s))))
    }

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
        )
    }

    #[test]
    fn parse_text_chunk() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_chunk(data), Chunk::Text("Hello".to_string()));
    }

    #[test]
    fn parse_role_only_chunk_is_skipped() {
        let data = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_chunk(data), Chunk::Skip);
    }

    #[test]
    fn parse_done_sentinel() {
        assert_eq!(parse_chunk("[DONE]"), Chunk::Done);
    }

    #[test]
    fn parse_error_chunk() {
        let data = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        assert_eq!(parse_chunk(data), Chunk::Failed("Rate limit reached".to_string()));
    }

    #[test]
    fn parse_garbage_is_skipped() {
        assert_eq!(parse_chunk("not json"), Chunk::Skip);
    }

    #[tokio::test]
    async fn decode_stream_in_order() {
        let first = delta("Hel");
        let second = delta("lo");
        let body = format!("{first}{second}data: [DONE]\n\n");

        let events: Vec<_> = decode_stream(byte_stream(vec![body])).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("Hel".to_string()),
                StreamEvent::TextDelta("lo".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn decode_stream_without_done_sentinel_still_terminates() {
        let events: Vec<_> = decode_stream(byte_stream(vec![delta("partial")]))
            .collect()
            .await;
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta("partial".to_string()), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn decode_stream_error_chunk_stops() {
        let body = "data: {\"error\":{\"message\":\"overloaded\"}}\n\ndata: [DONE]\n\n";
        let events: Vec<_> = decode_stream(byte_stream(vec![body.to_string()]))
            .collect()
            .await;
        assert_eq!(events, vec![StreamEvent::Error("overloaded".to_string())]);
    }

    #[tokio::test]
    async fn decode_stream_transport_error() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let events: Vec<_> = decode_stream(stream).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::TextDelta("a".to_string()));
        assert!(matches!(&events[1], StreamEvent::Error(e) if e.contains("reset")));
    }

    #[test]
    fn request_body_shape() {
        let messages = vec![ChatMessage::system("identity"), ChatMessage::user("hi")];
        let body = ApiRequest {
            model: "gpt-4.1",
            messages: &messages,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4.1");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn non_streaming_response_text_extraction() {
        let json = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"rm *.log"}}]}"#;
        let resp: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(first_choice_text(resp).unwrap(), "rm *.log");
    }

    #[test]
    fn non_streaming_response_without_choices() {
        let resp: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_choice_text(resp), Err(BackendError::Api(_))));
    }

    #[test]
    fn local_client_base_url() {
        let client = OpenAiClient::local("192.168.1.20", 1234).unwrap();
        assert_eq!(client.base_url(), "http://192.168.1.20:1234/v1");
        assert_eq!(client.endpoint(), "http://192.168.1.20:1234/v1/chat/completions");
    }

    #[test]
    fn hosted_endpoint_tolerates_trailing_slash() {
        let client = OpenAiClient::hosted("https://example.test/v1/", None).unwrap();
        assert_eq!(client.endpoint(), "https://example.test/v1/chat/completions");
    }

    #[tokio::test]
    async fn hosted_without_key_fails_before_sending() {
        let client = OpenAiClient::hosted(HOSTED_BASE_URL, None).unwrap();
        let request = ChatRequest::new("gpt-4.1", vec![ChatMessage::user("hi")]);
        let result = client.send_non_streaming(&request).await;
        assert!(matches!(result, Err(BackendError::MissingApiKey)));

        let events: Vec<_> = client.send(&request).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(e) if e.contains("API key")));
    }
}
