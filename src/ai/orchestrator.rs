//! Conversation orchestrator — one per character session.
//!
//! Drives a turn end to end: record the user line, ask the provider, record
//! the reply, then turn its directive into something a renderer can show.
//! Only one request is in flight at a time; input arriving meanwhile is
//! rejected rather than queued.

use crate::ai::character::CharacterProfile;
use crate::ai::history::{self, ConversationHistory, Role, Turn};
use crate::ai::presentation::{motion_cue, MotionCue, PresentationTable, VisualState};
use crate::ai::prompts;
use crate::ai::tags::{parse_directive, strip_tags};
use crate::error::GenerationError;
use crate::llm::provider::GenerationProvider;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What the renderer should show after a pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Presentation {
    pub text: String,
    /// `None` leaves the character's current look untouched.
    pub visual: Option<VisualState>,
    pub motion: Option<MotionCue>,
}

impl Presentation {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visual: None,
            motion: None,
        }
    }
}

/// Receives every display update. Implementations must not block.
pub trait RenderSink: Send + Sync {
    fn render(&self, presentation: &Presentation);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Busy,
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Nothing happened: no turn recorded, nothing rendered.
    Rejected(RejectReason),
    Responded(Presentation),
    /// The user turn was kept; the error text was rendered instead of a reply.
    Failed(GenerationError),
}

pub struct ConversationOrchestrator {
    profile: CharacterProfile,
    table: PresentationTable,
    log_path: PathBuf,
    history: Mutex<ConversationHistory>,
    awaiting: AtomicBool,
    provider: Arc<dyn GenerationProvider>,
    sink: Arc<dyn RenderSink>,
}

/// Clears the awaiting flag when a submit finishes, however it finishes.
struct AwaitingGuard<'a>(&'a AtomicBool);

impl Drop for AwaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ConversationOrchestrator {
    pub fn new(
        profile: CharacterProfile,
        log_path: PathBuf,
        provider: Arc<dyn GenerationProvider>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        let table = profile.presentation_table();
        Self {
            profile,
            table,
            log_path,
            history: Mutex::new(ConversationHistory::new()),
            awaiting: AtomicBool::new(false),
            provider,
            sink,
        }
    }

    /// Session whose log lives at the character's standard path in `data_dir`.
    pub fn for_character(
        profile: CharacterProfile,
        data_dir: &Path,
        provider: Arc<dyn GenerationProvider>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        let log_path = history::chat_log_path(data_dir, &profile.name);
        Self::new(profile, log_path, provider, sink)
    }

    pub fn profile(&self) -> &CharacterProfile {
        &self.profile
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn state(&self) -> ConversationState {
        if self.awaiting.load(Ordering::Acquire) {
            ConversationState::AwaitingResponse
        } else {
            ConversationState::Idle
        }
    }

    pub async fn history(&self) -> ConversationHistory {
        self.history.lock().await.clone()
    }

    /// Load the saved log into memory and show where the conversation left
    /// off. Call once, before the first `submit`.
    pub async fn restore(&self) -> Option<Presentation> {
        let loaded = history::load(&self.log_path);
        let mut history = self.history.lock().await;
        *history = loaded;

        let last = history.turns().last()?;
        let presentation = match last.role {
            Role::Model => self.present_reply(&last.text),
            Role::User => Presentation::text_only(strip_tags(&last.text)),
        };
        drop(history);

        tracing::info!(
            "[Chat] Restored session for '{}' from {}",
            self.profile.name,
            self.log_path.display()
        );
        self.sink.render(&presentation);
        Some(presentation)
    }

    pub async fn submit(&self, user_text: &str) -> SubmitOutcome {
        if user_text.trim().is_empty() {
            return SubmitOutcome::Rejected(RejectReason::Blank);
        }
        if self
            .awaiting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("[Chat] Ignoring input while awaiting a response");
            return SubmitOutcome::Rejected(RejectReason::Busy);
        }
        let _guard = AwaitingGuard(&self.awaiting);

        let snapshot = {
            let mut history = self.history.lock().await;
            history.push(Turn::user(user_text));
            self.persist(&history);
            history.turns().to_vec()
        };

        self.sink
            .render(&Presentation::text_only(prompts::thinking_message(&self.profile.name)));

        match self
            .provider
            .send(&snapshot, &self.profile.system_instruction)
            .await
        {
            Ok(reply) => {
                {
                    let mut history = self.history.lock().await;
                    history.push(Turn::model(reply.as_str()));
                    self.persist(&history);
                }
                let presentation = self.present_reply(&reply);
                self.sink.render(&presentation);
                SubmitOutcome::Responded(presentation)
            }
            Err(e) => {
                tracing::error!(
                    "[Chat] Generation via {} failed: {}",
                    self.provider.id(),
                    e
                );
                let text = e.user_message();
                let presentation = Presentation {
                    visual: Some(self.table.fallback_state()),
                    motion: Some(motion_cue(self.table.fallback_emotion(), &text, &self.table)),
                    text,
                };
                self.sink.render(&presentation);
                SubmitOutcome::Failed(e)
            }
        }
    }

    /// Start over: forget every turn and delete the log.
    pub async fn reset(&self) {
        {
            let mut history = self.history.lock().await;
            history::reset(&self.log_path, &mut history);
        }
        tracing::info!("[Chat] Conversation with '{}' reset", self.profile.name);
        self.sink
            .render(&Presentation::text_only(prompts::NEW_CONVERSATION_MESSAGE));
    }

    fn present_reply(&self, reply: &str) -> Presentation {
        let directive = parse_directive(
            reply,
            self.table.fallback_emotion(),
            self.table.default_costume(),
        );
        let text = strip_tags(reply);
        Presentation {
            visual: Some(self.table.resolve_directive(&directive)),
            motion: Some(motion_cue(&directive.emotion, &text, &self.table)),
            text,
        }
    }

    fn persist(&self, history: &ConversationHistory) {
        if let Err(e) = history::save(&self.log_path, history) {
            tracing::warn!("[Chat] {}", e);
        }
    }
}
