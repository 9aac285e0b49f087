use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures of the durable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// Diagram source a renderer refuses to turn into an artifact.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RenderError {
    #[error("diagram source is empty")]
    Empty,

    #[error("not a Mermaid flowchart: {0:?}")]
    UnknownHeader(String),

    #[error("diagram source contains a code fence")]
    EmbeddedFence,
}

impl StoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
