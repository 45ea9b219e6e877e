pub mod ai;
pub mod config;
pub mod error;
pub mod llm;
pub mod utils;

pub use ai::character::CharacterProfile;
pub use ai::orchestrator::{ConversationOrchestrator, Presentation, RenderSink, SubmitOutcome};
pub use error::{ConfigError, GenerationError, PersistenceError};
pub use llm::gemini::GeminiClient;
pub use llm::provider::GenerationProvider;
