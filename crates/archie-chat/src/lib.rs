pub mod engine;
mod error;
pub mod prompt;
pub mod session;

use archie_core::Turn;
use async_trait::async_trait;

pub use engine::LlmCompletion;
pub use error::{CompletionError, SessionError};
pub use session::{Conversation, CycleOutcome, Phase, SessionConfig, FALLBACK_REPLY};

/// The language model as seen by the conversation: system instructions plus the
/// ordered turn history in, reply text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system: &str, turns: &[Turn]) -> Result<String, CompletionError>;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for std::sync::Arc<T> {
    async fn complete(&self, system: &str, turns: &[Turn]) -> Result<String, CompletionError> {
        (**self).complete(system, turns).await
    }
}
