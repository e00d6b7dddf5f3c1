//! Mock provider for testing.
//!
//! Produces the same `StreamEvent` sequences as the HTTP client, so every
//! layer above the backend can be tested without a network. `MockBackend`
//! replays a queue of scripted replies and records the requests it saw.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_stream::stream;
use cdv_protocol::{ChatRequest, StreamEvent};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::time::sleep;

use crate::backend::{BackendError, ChatBackend};

/// One scripted step of a reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Emit a text chunk.
    Text { content: String },
    /// Fail the reply with this detail. Nothing after it is emitted.
    Error { message: String },
    /// Pause before the next step.
    Delay { ms: u64 },
}

/// A complete scripted reply.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub responses: Vec<MockResponse>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }
}

/// Replay a scripted reply as a stream.
pub fn mock_stream(config: MockConfig) -> impl Stream<Item = StreamEvent> {
    stream! {
        for response in config.responses {
            match response {
                MockResponse::Text { content } => {
                    yield StreamEvent::TextDelta(content);
                }
                MockResponse::Error { message } => {
                    yield StreamEvent::Error(message);
                    return;
                }
                MockResponse::Delay { ms } => {
                    sleep(Duration::from_millis(ms)).await;
                }
            }
        }

        yield StreamEvent::Done;
    }
}

/// Ready-made replies for common scenarios.
pub mod fixtures {
    use super::*;

    /// A reply consisting of a single chunk.
    pub fn reply(text: &str) -> MockConfig {
        chunks(&[text])
    }

    /// A reply streamed as the given chunks, in order.
    pub fn chunks(parts: &[&str]) -> MockConfig {
        let responses = parts
            .iter()
            .map(|part| MockResponse::Text {
                content: (*part).to_string(),
            })
            .collect();
        MockConfig::new().with_responses(responses)
    }

    /// A reply that fails before producing any text.
    pub fn failure(message: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![MockResponse::Error {
            message: message.to_string(),
        }])
    }

    /// A reply that streams some text and then fails.
    pub fn error_mid_stream(text_before: &str, message: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Text {
                content: text_before.to_string(),
            },
            MockResponse::Error {
                message: message.to_string(),
            },
        ])
    }
}

/// A `ChatBackend` that answers from a script.
///
/// Each call (streaming or not) consumes the next scripted reply. When the
/// script runs dry the call fails, which keeps tests honest about how many
/// backend round trips a flow makes.
#[derive(Debug, Default)]
pub struct MockBackend {
    script: Mutex<VecDeque<MockConfig>>,
    requests: Mutex<Vec<ChatRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<MockConfig>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: MockConfig) {
        lock(&self.script).push_back(reply);
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }

    fn next_reply(&self, request: &ChatRequest) -> MockConfig {
        lock(&self.requests).push(request.clone());
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| fixtures::failure("mock backend has no scripted reply"))
    }
}

impl ChatBackend for MockBackend {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, Result<String, BackendError>> {
        let reply = self.next_reply(request);
        Box::pin(async move {
            let mut events = std::pin::pin!(mock_stream(reply));
            let mut text = String::new();
            while let Some(event) = events.next().await {
                match event {
                    StreamEvent::TextDelta(chunk) => text.push_str(&chunk),
                    StreamEvent::Done => break,
                    StreamEvent::Error(message) => return Err(BackendError::Api(message)),
                }
            }
            Ok(text)
        })
    }

    fn stream(&self, request: &ChatRequest) -> BoxStream<'static, StreamEvent> {
        mock_stream(self.next_reply(request)).boxed()
    }
}
