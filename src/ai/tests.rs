//! End-to-end tests for a chat session.
//!
//! These tests verify:
//! 1. A reply is recorded, persisted and rendered with its directive applied
//! 2. Generation failures render their message and record no model turn
//! 3. Input while a request is in flight changes nothing
//! 4. Reset and restore round-trip through the chat log
//!
//! The provider is scripted, so no network is involved, except in the last
//! test which runs the real Gemini client against wiremock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_test::{assert_pending, assert_ready};

use super::character::CharacterProfile;
use super::history::{self, Turn};
use super::orchestrator::{
    ConversationOrchestrator, ConversationState, Presentation, RejectReason, RenderSink,
    SubmitOutcome,
};
use super::presentation::VisualState;
use super::prompts;
use crate::error::GenerationError;
use crate::llm::provider::GenerationProvider;

const SHIBA: &str = r#"{
    "name": "임승혁",
    "system_instruction": "당신은 애완 시바견입니다. 마지막에 [감정]을 붙이세요.",
    "model_type": "STANDARD_ANIMATOR",
    "animator_emotions": {
        "행복": { "eye": 1, "eyebrow": 1, "mouth": 1, "effect": 1 },
        "평온": { "eye": 2, "eyebrow": 2, "mouth": 2, "effect": 0 },
        "슬픔": { "eye": 4, "eyebrow": 4, "mouth": 4, "effect": 4 }
    },
    "animator_states": ["Talk", "Idle", "행복_Talk"],
    "costumes": { "수영복": 1, "교복": 2 }
}"#;

/// Helper: a provider that replays scripted outcomes and records calls.
#[derive(Default)]
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: Mutex<Vec<Vec<Turn>>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn send(
        &self,
        history: &[Turn],
        _system_instruction: &str,
    ) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(history.to_vec());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }

    fn id(&self) -> &str {
        "scripted"
    }
}

/// Helper: a sink that keeps every rendered frame.
#[derive(Default)]
struct RecordingSink {
    frames: Mutex<Vec<Presentation>>,
}

impl RecordingSink {
    fn texts(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.text.clone())
            .collect()
    }

    fn last(&self) -> Presentation {
        self.frames.lock().unwrap().last().cloned().unwrap()
    }
}

impl RenderSink for RecordingSink {
    fn render(&self, presentation: &Presentation) {
        self.frames.lock().unwrap().push(presentation.clone());
    }
}

struct Session {
    _dir: TempDir,
    provider: Arc<ScriptedProvider>,
    sink: Arc<RecordingSink>,
    chat: ConversationOrchestrator,
}

fn profile() -> CharacterProfile {
    serde_json::from_str(SHIBA).unwrap()
}

fn session(provider: ScriptedProvider) -> Session {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(provider);
    let sink = Arc::new(RecordingSink::default());
    let chat = ConversationOrchestrator::for_character(
        profile(),
        dir.path(),
        provider.clone(),
        sink.clone(),
    );
    Session {
        _dir: dir,
        provider,
        sink,
        chat,
    }
}

fn animator_codes(presentation: &Presentation) -> (i32, i32) {
    match presentation.visual.as_ref() {
        Some(VisualState::Animator { codes, costume_id }) => (codes.eye, *costume_id),
        other => panic!("expected animator state, got {:?}", other),
    }
}

// ── Submit ─────────────────────────────────────────────────

#[tokio::test]
async fn reply_is_recorded_and_rendered_with_directive() {
    let s = session(ScriptedProvider::new(vec![Ok(
        "바다 가요! [행복][복장:수영복]".to_string(),
    )]));

    let presentation = match s.chat.submit("산책 갈까?").await {
        SubmitOutcome::Responded(presentation) => presentation,
        other => panic!("expected a reply, got {:?}", other),
    };

    assert_eq!(presentation.text, "바다 가요!");
    assert_eq!(animator_codes(&presentation), (1, 1));
    let motion = presentation.motion.clone().unwrap();
    assert_eq!(motion.talk_state, "행복_Talk");
    assert_eq!(motion.idle_state, "Idle");
    assert_eq!(motion.talk_seconds, 1.0);

    assert_eq!(s.sink.texts(), vec!["임승혁 생각 중...", "바다 가요!"]);
    assert_eq!(
        s.chat.history().await.turns(),
        &[
            Turn::user("산책 갈까?"),
            Turn::model("바다 가요! [행복][복장:수영복]")
        ]
    );
    assert_eq!(history::load(s.chat.log_path()), s.chat.history().await);
    assert_eq!(s.chat.state(), ConversationState::Idle);
}

#[tokio::test]
async fn provider_sees_the_whole_conversation() {
    let s = session(ScriptedProvider::new(vec![
        Ok("멍! [행복]".to_string()),
        Ok("왈! [평온]".to_string()),
    ]));

    s.chat.submit("안녕").await;
    s.chat.submit("뭐해?").await;

    let calls = s.provider.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], vec![Turn::user("안녕")]);
    assert_eq!(
        calls[1],
        vec![
            Turn::user("안녕"),
            Turn::model("멍! [행복]"),
            Turn::user("뭐해?")
        ]
    );
}

#[tokio::test]
async fn unknown_emotion_shows_fallback_state() {
    let s = session(ScriptedProvider::new(vec![Ok("음... [혼란]".to_string())]));

    let SubmitOutcome::Responded(presentation) = s.chat.submit("퀴즈!").await else {
        panic!("expected a reply");
    };
    assert_eq!(presentation.text, "음...");
    assert_eq!(animator_codes(&presentation), (2, 0));
    assert_eq!(presentation.motion.unwrap().talk_state, "Talk");
}

#[tokio::test]
async fn unknown_emotion_talks_with_generic_state() {
    let dir = TempDir::new().unwrap();
    let profile: CharacterProfile = serde_json::from_str(
        &SHIBA.replace(r#""행복_Talk"]"#, r#""행복_Talk", "평온_Talk"]"#),
    )
    .unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![Ok("음... [혼란]".to_string())]));
    let sink = Arc::new(RecordingSink::default());
    let chat = ConversationOrchestrator::for_character(profile, dir.path(), provider, sink);

    let SubmitOutcome::Responded(presentation) = chat.submit("퀴즈!").await else {
        panic!("expected a reply");
    };
    // The look falls back to 평온, but the talk state follows the raw tag.
    assert_eq!(animator_codes(&presentation), (2, 0));
    assert_eq!(presentation.motion.unwrap().talk_state, "Talk");
}

#[tokio::test]
async fn overload_renders_message_and_records_no_model_turn() {
    let s = session(ScriptedProvider::new(vec![Err(GenerationError::Overloaded {
        attempts: 3,
    })]));

    let outcome = s.chat.submit("안녕?").await;
    assert_eq!(
        outcome,
        SubmitOutcome::Failed(GenerationError::Overloaded { attempts: 3 })
    );

    let last = s.sink.last();
    assert_eq!(last.text, prompts::OVERLOADED_MESSAGE);
    assert_eq!(animator_codes(&last), (2, 0));
    assert_eq!(s.chat.history().await.turns(), &[Turn::user("안녕?")]);
    assert_eq!(history::load(s.chat.log_path()).len(), 1);
    assert_eq!(s.chat.state(), ConversationState::Idle);
}

#[tokio::test]
async fn terminal_error_shows_status() {
    let s = session(ScriptedProvider::new(vec![Err(
        GenerationError::TerminalServer { status: 403 },
    )]));

    s.chat.submit("안녕?").await;
    assert_eq!(s.sink.last().text, "치명적 오류 발생 (403).");
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let s = session(ScriptedProvider::new(vec![]));

    assert_eq!(
        s.chat.submit("   ").await,
        SubmitOutcome::Rejected(RejectReason::Blank)
    );
    assert_eq!(s.provider.call_count(), 0);
    assert!(s.sink.texts().is_empty());
    assert!(!s.chat.log_path().exists());
}

#[tokio::test]
async fn input_while_awaiting_is_rejected() {
    let gate = Arc::new(Notify::new());
    let s = session(
        ScriptedProvider::new(vec![Ok("기다렸죠? [행복]".to_string())]).gated(gate.clone()),
    );

    let mut first = tokio_test::task::spawn(s.chat.submit("첫 번째"));
    assert_pending!(first.poll());
    assert_eq!(s.chat.state(), ConversationState::AwaitingResponse);

    assert_eq!(
        s.chat.submit("두 번째").await,
        SubmitOutcome::Rejected(RejectReason::Busy)
    );
    assert_eq!(s.provider.call_count(), 1);
    assert_eq!(s.chat.history().await.turns(), &[Turn::user("첫 번째")]);

    gate.notify_one();
    let outcome = assert_ready!(first.poll());
    assert!(matches!(outcome, SubmitOutcome::Responded(_)));
    assert_eq!(s.chat.state(), ConversationState::Idle);
    assert_eq!(s.chat.history().await.len(), 2);
}

// ── Reset / restore ────────────────────────────────────────

#[tokio::test]
async fn reset_is_allowed_while_awaiting() {
    let gate = Arc::new(Notify::new());
    let s = session(
        ScriptedProvider::new(vec![Ok("늦었죠? [평온]".to_string())]).gated(gate.clone()),
    );

    let mut first = tokio_test::task::spawn(s.chat.submit("안녕"));
    assert_pending!(first.poll());
    assert!(s.chat.log_path().exists());

    s.chat.reset().await;
    assert!(!s.chat.log_path().exists());
    assert!(s.chat.history().await.is_empty());
    assert_eq!(s.chat.state(), ConversationState::AwaitingResponse);

    gate.notify_one();
    let outcome = assert_ready!(first.poll());
    assert!(matches!(outcome, SubmitOutcome::Responded(_)));
    assert_eq!(s.chat.state(), ConversationState::Idle);
    // The late reply starts the fresh conversation.
    assert_eq!(
        s.chat.history().await.turns(),
        &[Turn::model("늦었죠? [평온]")]
    );
}

#[tokio::test]
async fn reset_forgets_everything() {
    let s = session(ScriptedProvider::new(vec![Ok("멍! [행복]".to_string())]));
    s.chat.submit("안녕").await;
    assert!(s.chat.log_path().exists());

    s.chat.reset().await;

    assert!(s.chat.history().await.is_empty());
    assert!(!s.chat.log_path().exists());
    assert_eq!(s.sink.last(), Presentation::text_only(prompts::NEW_CONVERSATION_MESSAGE));
}

#[tokio::test]
async fn restore_resumes_from_log() {
    let s = session(ScriptedProvider::new(vec![Ok("잘 자요 [슬픔][복장:교복]".to_string())]));
    s.chat.submit("잘 자").await;

    let sink = Arc::new(RecordingSink::default());
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let resumed = ConversationOrchestrator::new(
        profile(),
        s.chat.log_path().to_path_buf(),
        provider,
        sink.clone(),
    );

    let presentation = resumed.restore().await.unwrap();
    assert_eq!(presentation.text, "잘 자요");
    assert_eq!(animator_codes(&presentation), (4, 2));
    assert_eq!(sink.texts(), vec!["잘 자요"]);
    assert_eq!(resumed.history().await, s.chat.history().await);
}

#[tokio::test]
async fn restore_without_log_renders_nothing() {
    let s = session(ScriptedProvider::new(vec![]));
    assert!(s.chat.restore().await.is_none());
    assert!(s.sink.texts().is_empty());
}

// ── Against the HTTP API ───────────────────────────────────

#[tokio::test]
async fn exhausted_retries_surface_as_overload_message() {
    use crate::llm::gemini::GeminiClient;
    use crate::llm::llm_config::LlmConfig;
    use crate::utils::http::BackoffTimer;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoWait;

    #[async_trait]
    impl BackoffTimer for NoWait {
        async fn sleep(&self, _duration: Duration) {}
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = LlmConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        api_key_env: None,
        ..LlmConfig::default()
    };
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let client = GeminiClient::with_client(config, http)
        .unwrap()
        .with_timer(Arc::new(NoWait));

    let dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let chat = ConversationOrchestrator::for_character(
        profile(),
        dir.path(),
        Arc::new(client),
        sink.clone(),
    );

    let outcome = chat.submit("안녕?").await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Failed(GenerationError::Overloaded { attempts: 3 })
    ));
    assert_eq!(sink.last().text, prompts::OVERLOADED_MESSAGE);
    assert_eq!(chat.history().await.turns(), &[Turn::user("안녕?")]);
}
