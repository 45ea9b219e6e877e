use anyhow::{bail, Context, Result};
use companion_chat_lib::ai::character::{find_character, load_roster, CharacterProfile};
use companion_chat_lib::ai::history;
use companion_chat_lib::ai::orchestrator::{ConversationOrchestrator, Presentation, RenderSink};
use companion_chat_lib::ai::presentation::VisualState;
use companion_chat_lib::config;
use companion_chat_lib::llm::gemini::GeminiClient;
use companion_chat_lib::llm::llm_config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const USAGE: &str = "usage: companion-chat <roster-dir> [character name] | <character.json>";

/// Prints replies to stdout; the visual state goes to the log.
struct ConsoleSink;

impl RenderSink for ConsoleSink {
    fn render(&self, presentation: &Presentation) {
        println!("{}", presentation.text);
        match &presentation.visual {
            Some(VisualState::Animator { codes, costume_id }) => tracing::debug!(
                "[Render] animator {:?}, costume {}",
                codes,
                costume_id
            ),
            Some(VisualState::BlendShapes { weights, costume_id }) => tracing::debug!(
                "[Render] {} blend shapes, costume {}",
                weights.len(),
                costume_id
            ),
            None => {}
        }
        if let Some(motion) = &presentation.motion {
            tracing::debug!(
                "[Render] {} for {:.1}s, then {}",
                motion.talk_state,
                motion.talk_seconds,
                motion.idle_state
            );
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Character selection: one line per character with its last reply.
fn print_menu(roster: &[CharacterProfile], data_dir: &Path) {
    for profile in roster {
        let summary = history::summarize(data_dir, &profile.name);
        println!("{}  |  {}", summary.name, summary.last_response);
    }
}

fn select_character(args: &[String], data_dir: &Path) -> Result<Option<CharacterProfile>> {
    let Some(target) = args.first().map(PathBuf::from) else {
        bail!(USAGE);
    };

    if target.is_file() {
        return Ok(Some(CharacterProfile::load(&target)?));
    }

    let roster = load_roster(&target);
    if roster.is_empty() {
        bail!("no characters found in {}", target.display());
    }
    match args.get(1) {
        None => {
            print_menu(&roster, data_dir);
            Ok(None)
        }
        Some(name) => find_character(&roster, name)
            .cloned()
            .map(Some)
            .with_context(|| format!("no character named '{}'", name)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let data_dir = config::default_data_dir();
    let Some(profile) = select_character(&args, &data_dir)? else {
        return Ok(());
    };

    let llm_config = llm_config::load_config(&data_dir.join("llm_config.json"));
    let client = GeminiClient::new(llm_config).context("cannot start generation client")?;

    let chat = ConversationOrchestrator::for_character(
        profile,
        &data_dir,
        Arc::new(client),
        Arc::new(ConsoleSink),
    );
    chat.restore().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/reset" => chat.reset().await,
            _ => {
                chat.submit(&line).await;
            }
        }
    }
    Ok(())
}
