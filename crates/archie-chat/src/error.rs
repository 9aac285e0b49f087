use std::time::Duration;

use thiserror::Error;

/// Anything that can go wrong while asking the completion service for a reply.
/// The conversation treats all of these the same way.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("build LLM: {0}")]
    Build(String),

    #[error("chat: {0}")]
    Request(String),

    #[error("LLM returned no text")]
    EmptyResponse,

    #[error("no reply within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Submissions the conversation refuses outright.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a reply is still pending; wait for it before sending another message")]
    Busy,

    #[error("message is empty")]
    EmptyInput,
}
