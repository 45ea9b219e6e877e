//! Conversation history and its on-disk chat log.
//!
//! One UTF-8 file per character, one turn per line: `[user]text` or
//! `[model]text`. Model turns are stored verbatim, tags included, so the
//! directive can be re-parsed after a restart. A newline inside a turn splits
//! it on reload; the log format has no escaping.

use crate::ai::prompts;
use crate::ai::tags::strip_tags;
use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const USER_PREFIX: &str = "[user]";
const MODEL_PREFIX: &str = "[model]";
const LOG_SUFFIX: &str = "_chat_log.txt";
const SUMMARY_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    fn prefix(self) -> &'static str {
        match self {
            Role::User => USER_PREFIX,
            Role::Model => MODEL_PREFIX,
        }
    }

    /// Role name on the generation API.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }

    fn parse_line(line: &str) -> Option<Self> {
        if let Some(text) = line.strip_prefix(USER_PREFIX) {
            Some(Turn::user(text))
        } else {
            line.strip_prefix(MODEL_PREFIX).map(Turn::model)
        }
    }
}

/// Ordered turns of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Clean text of the newest turn, for redisplay after a restart.
    pub fn last_clean_text(&self) -> Option<String> {
        self.turns.last().map(|turn| strip_tags(&turn.text))
    }
}

impl From<Vec<Turn>> for ConversationHistory {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

// ── Persistence ────────────────────────────────────────────

/// Read a chat log. Never fails: a missing file is an empty history, and a
/// read error keeps whatever was parsed before it.
pub fn load(path: &Path) -> ConversationHistory {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ConversationHistory::new();
        }
        Err(e) => {
            tracing::warn!("[History] Cannot open {}: {}", path.display(), e);
            return ConversationHistory::new();
        }
    };

    // Split on '\n' only; a trailing '\r' belongs to the turn text.
    let mut history = ConversationHistory::new();
    for line in BufReader::new(file).split(b'\n') {
        let line = line.and_then(|bytes| {
            String::from_utf8(bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        });
        match line {
            Ok(line) => {
                if let Some(turn) = Turn::parse_line(&line) {
                    history.push(turn);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[History] Read error in {} after {} turns: {}",
                    path.display(),
                    history.len(),
                    e
                );
                break;
            }
        }
    }
    tracing::info!(
        "[History] Loaded {} turns from {}",
        history.len(),
        path.display()
    );
    history
}

/// Rewrite the whole log. The content goes to a sibling temp file first and
/// is renamed over the log, so a crash never leaves a half-written file.
pub fn save(path: &Path, history: &ConversationHistory) -> Result<(), PersistenceError> {
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut content = String::new();
    for turn in history.turns().iter().filter(|t| !t.text.is_empty()) {
        content.push_str(turn.role.prefix());
        content.push_str(&turn.text);
        content.push('\n');
    }

    let tmp = tmp_path(path);
    let result = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        })
        .and_then(|_| std::fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e));
    }

    tracing::debug!(
        "[History] Saved {} turns ({} bytes) to {}",
        history.len(),
        content.len(),
        path.display()
    );
    Ok(())
}

/// Forget the conversation: clear memory and delete the log. A failed
/// delete is logged; the in-memory history is cleared regardless.
pub fn reset(path: &Path, history: &mut ConversationHistory) {
    history.clear();
    if let Err(e) = delete_log(path) {
        tracing::warn!("[History] {}", e);
    }
}

fn delete_log(path: &Path) -> Result<(), PersistenceError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("[History] Deleted {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError::Delete {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── Menu support ───────────────────────────────────────────

/// `<dir>/<safe name>_chat_log.txt`, where every character outside ASCII
/// alphanumerics and Hangul syllables becomes `_`.
pub fn chat_log_path(dir: &Path, character_name: &str) -> PathBuf {
    let safe: String = character_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || ('가'..='힣').contains(&c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{}{}", safe, LOG_SUFFIX))
}

/// Clean text of the last model line in a log; `None` if that line holds
/// nothing but tags.
pub fn last_model_response(path: &Path) -> Option<String> {
    load(path)
        .turns()
        .iter()
        .rev()
        .find(|turn| turn.role == Role::Model)
        .map(|turn| strip_tags(&turn.text))
        .filter(|text| !text.is_empty())
}

/// One row of the character selection menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatLogSummary {
    pub name: String,
    pub save_file_name: String,
    pub last_response: String,
}

pub fn summarize(dir: &Path, character_name: &str) -> ChatLogSummary {
    let path = chat_log_path(dir, character_name);
    let save_file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let last_response = match last_model_response(&path) {
        Some(text) if text.chars().count() > SUMMARY_CHARS => {
            let head: String = text.chars().take(SUMMARY_CHARS).collect();
            format!("{}...", head)
        }
        Some(text) => text,
        None => prompts::NEW_CHAT_PLACEHOLDER.to_string(),
    };

    ChatLogSummary {
        name: character_name.replace('_', " "),
        save_file_name,
        last_response,
    }
}
