//! Events emitted by a streaming completion.

/// One step of a streaming reply.
///
/// A well-formed stream is zero or more `TextDelta`s followed by exactly one
/// `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of reply text, in arrival order.
    TextDelta(String),

    /// The backend signalled end of stream.
    Done,

    /// The request or the stream failed. Carries backend-supplied detail.
    Error(String),
}
