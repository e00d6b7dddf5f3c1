//! The active chat target and the two ways the session talks to it.

use std::fmt;
use std::sync::Arc;

use cdv_backend::probe::{self, PROBE_TIMEOUT};
use cdv_backend::{BackendError, ChatBackend, OpenAiClient};
use cdv_protocol::{ChatMessage, ChatRequest, StreamEvent};
use futures::StreamExt;

use crate::config::Config;
use crate::history::Conversation;

/// Where a model is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Hosted,
    Local,
}

/// A backend plus the model name sent with every request.
///
/// Cloning is cheap; switching models replaces the client and leaves the
/// conversation alone.
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ChatBackend>,
    model: String,
    origin: Origin,
}

impl fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClient")
            .field("model", &self.model)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>, origin: Origin) -> Self {
        Self {
            backend,
            model: model.into(),
            origin,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Stream an answer to `prompt`, handing each chunk to `on_chunk` as it
    /// arrives. The prompt and the full reply are both recorded.
    ///
    /// If the stream fails the prompt stays recorded and the partial reply
    /// is discarded.
    pub async fn ask<F>(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
        mut on_chunk: F,
    ) -> Result<String, BackendError>
    where
        F: FnMut(&str),
    {
        conversation.push_user(prompt);
        let request = ChatRequest::new(&self.model, conversation.messages().to_vec());
        tracing::debug!(model = %self.model, messages = request.messages.len(), "streaming request");

        let mut events = self.backend.stream(&request);
        let mut reply = String::new();
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::TextDelta(chunk) => {
                    on_chunk(&chunk);
                    reply.push_str(&chunk);
                }
                StreamEvent::Done => break,
                StreamEvent::Error(detail) => return Err(BackendError::Api(detail)),
            }
        }

        conversation.push_assistant(reply.clone());
        Ok(reply)
    }

    /// Ask for a single command line. The reply is recorded and returned
    /// verbatim; nothing guarantees it is a valid command.
    pub async fn generate_command(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
    ) -> Result<String, BackendError> {
        conversation.push_user(command_prompt(prompt));
        let request = ChatRequest::new(&self.model, conversation.messages().to_vec());
        tracing::debug!(model = %self.model, messages = request.messages.len(), "command request");

        let reply = self.backend.complete(&request).await?;
        conversation.push_assistant(reply.clone());
        Ok(reply)
    }

    /// One-off request outside any conversation.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, BackendError> {
        let request = ChatRequest::new(&self.model, messages);
        self.backend.complete(&request).await
    }
}

/// Wrap a request so the reply is nothing but the command.
pub fn command_prompt(request: &str) -> String {
    format!(
        "The user is asking you to run a command that accomplishes the following: {request}\n\
         Since this is a request for YOU to run the command, it is VITAL that you reply ONLY \
         with the command. No code block. No comments. Reply only with the command so that it \
         can be sent straight to the shell and work as expected. If it is not possible to do \
         what the user wants, or it is too dangerous, reply with a command that prints why."
    )
}

/// Builds model clients for the switch directives.
pub trait BackendProvider {
    fn hosted(&self, model: &str) -> ModelClient;

    /// The local endpoint, or `None` when it is unconfigured or not listening.
    fn local(&self) -> Option<ModelClient>;
}

struct LocalEndpoint {
    host: String,
    port: u16,
    model: String,
    backend: Arc<dyn ChatBackend>,
}

/// Hosted API plus an optional local server, as configured.
pub struct EndpointProvider {
    hosted: Arc<dyn ChatBackend>,
    local: Option<LocalEndpoint>,
}

impl EndpointProvider {
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let hosted = OpenAiClient::hosted(
            config.backend.base_url.clone(),
            config.backend.api_key.clone(),
        )?;
        let local = match config.local.endpoint() {
            Some((host, port, model)) => Some(LocalEndpoint {
                host: host.to_string(),
                port,
                model: model.to_string(),
                backend: Arc::new(OpenAiClient::local(host, port)?),
            }),
            None => None,
        };
        Ok(Self {
            hosted: Arc::new(hosted),
            local,
        })
    }
}

impl BackendProvider for EndpointProvider {
    fn hosted(&self, model: &str) -> ModelClient {
        ModelClient::new(Arc::clone(&self.hosted), model, Origin::Hosted)
    }

    fn local(&self) -> Option<ModelClient> {
        let Some(endpoint) = &self.local else {
            tracing::debug!("no local endpoint configured");
            return None;
        };
        if !probe::is_listening(&endpoint.host, endpoint.port, PROBE_TIMEOUT) {
            tracing::warn!(host = %endpoint.host, port = endpoint.port, "local endpoint not listening");
            return None;
        }
        Some(ModelClient::new(
            Arc::clone(&endpoint.backend),
            &endpoint.model,
            Origin::Local,
        ))
    }
}
