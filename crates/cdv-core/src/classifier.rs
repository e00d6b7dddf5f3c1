//! Intent classification for free-form input.
//!
//! A standalone request to a (usually cheaper) model: it never reads or
//! writes the session conversation, only the instruction and the raw line.

use cdv_backend::BackendError;
use cdv_protocol::ChatMessage;

use crate::config::{Config, FALLBACK_CLASSIFIER_MODEL};
use crate::model::{BackendProvider, ModelClient};

const CLASSIFIER_INSTRUCTION: &str = "You are a command classifier. Your task is to analyze \
user input and determine its intent. Respond with only one of the following words: 'QUERY' \
if the user is asking a question or talking to an AI, 'COMMAND' if the user wants an AI to \
generate and run a command, or 'SHELL' if the user is directly typing a shell command. Do \
not include any other text or explanation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// A question for the model.
    Query,
    /// A request for the model to produce and run a command.
    Command,
    /// A literal shell command.
    Shell,
    /// Anything the classifier replied that is not one of the three labels.
    Unknown,
}

impl Intent {
    pub fn parse(reply: &str) -> Self {
        match reply.trim().to_ascii_uppercase().as_str() {
            "QUERY" => Intent::Query,
            "COMMAND" => Intent::Command,
            "SHELL" => Intent::Shell,
            _ => Intent::Unknown,
        }
    }
}

pub async fn classify(client: &ModelClient, input: &str) -> Result<Intent, BackendError> {
    let messages = vec![
        ChatMessage::system(CLASSIFIER_INSTRUCTION),
        ChatMessage::user(input),
    ];
    let reply = client.complete(messages).await?;
    let intent = Intent::parse(&reply);
    tracing::debug!(?intent, reply = %reply.trim(), model = client.model(), "classified");
    Ok(intent)
}

/// Pick the classification model once at startup. `local` uses the local
/// endpoint when it answers the probe and falls back to the hosted default.
pub fn resolve_target(config: &Config, provider: &dyn BackendProvider) -> ModelClient {
    if !config.classifier.uses_local() {
        return provider.hosted(config.classifier.model.trim());
    }
    match provider.local() {
        Some(client) => client,
        None => {
            tracing::warn!(
                fallback = FALLBACK_CLASSIFIER_MODEL,
                "local classifier unavailable, using hosted model"
            );
            provider.hosted(FALLBACK_CLASSIFIER_MODEL)
        }
    }
}
