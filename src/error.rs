//! Error taxonomy for the chat pipeline.
//!
//! Only `ConfigError` is allowed to stop a session from starting. Generation
//! failures are turned into display text by the orchestrator, and persistence
//! failures are logged and otherwise ignored.

use std::path::PathBuf;
use thiserror::Error;

use crate::ai::prompts;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key is missing or empty")]
    MissingApiKey,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid character data: {0}")]
    InvalidCharacter(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Terminal outcome of one `send` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Every attempt was answered with 429 or 503.
    #[error("server overloaded after {attempts} attempts")]
    Overloaded { attempts: u32 },

    #[error("server returned status {status}")]
    TerminalServer { status: u16 },

    #[error("response contained no usable candidate")]
    EmptyResponse,

    #[error("request failed: {0}")]
    Network(String),
}

impl GenerationError {
    /// Text shown to the user in place of a model reply.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::Overloaded { .. } => prompts::OVERLOADED_MESSAGE.to_string(),
            GenerationError::TerminalServer { status } => {
                format!("{} ({}).", prompts::FATAL_ERROR_PREFIX, status)
            }
            GenerationError::EmptyResponse => prompts::EMPTY_RESPONSE_MESSAGE.to_string(),
            // Transport failures have no status; shown as 0.
            GenerationError::Network(_) => format!("{} (0).", prompts::FATAL_ERROR_PREFIX),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write chat log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete chat log {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
