//! cdv-backend: Chat completion adapters for Codriver.
//!
//! One seam (`ChatBackend`) with two implementations: an OpenAI-compatible
//! HTTP client that serves both the hosted API and a local endpoint, and a
//! scripted mock used by tests throughout the workspace.

pub mod backend;
pub mod mock;
pub mod openai;
pub mod probe;
pub mod sse;

pub use backend::{BackendError, ChatBackend};
pub use mock::{MockBackend, MockConfig, MockResponse};
pub use openai::OpenAiClient;
