//! cdv-protocol: Shared chat types for Codriver.
//!
//! These are the values passed between the session core and the chat
//! completion backends: role-tagged messages, the request payload, and the
//! events a streaming reply is made of.

pub mod chat;
pub mod message;

pub use chat::{ChatMessage, ChatRequest, Role};
pub use message::StreamEvent;
