//! Generation provider trait — the seam between the conversation pipeline
//! and the remote model.

use async_trait::async_trait;

use crate::ai::history::Turn;
use crate::error::GenerationError;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Send the whole conversation and return the reply text, tags included.
    async fn send(
        &self,
        history: &[Turn],
        system_instruction: &str,
    ) -> Result<String, GenerationError>;

    /// Provider identifier (e.g. "gemini").
    fn id(&self) -> &str;
}
