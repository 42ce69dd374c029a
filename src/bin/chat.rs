//! Terminal chat front-end.
//!
//! Reads lines from stdin and sends them to the conversation controller.
//! Lines starting with `/` are commands (`/help` lists them). Diagnostics go
//! to stderr and to a daily log file under the data directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use companion::chat::{ChatEvent, ContinueOutcome, ConversationController, TurnOutcome};
use companion::config::CompanionConfig;
use companion::llm::InferenceAdapter;
use companion::notify::LogNotifier;
use companion::state::AppState;
use companion::store::{self, MessageStore, Settings, SqliteStore, Theme};
use companion::{Generation, companion_dirs};

const DEFAULT_LOG_FILTER: &str = "companion=info,mistralrs=warn";

const HELP: &str = "\
Commands:
  /continue                 extend the last answer
  /export [path]            write the conversation as JSON
  /clear                    delete all history
  /system <prompt>          set the system prompt
  /theme <light|dark|system>
  /lang <code|auto>
  /doc <path> [question]    ask about a text file
  /models                   list available models
  /quit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Say(String),
    Continue,
    Export(Option<PathBuf>),
    Clear,
    System(String),
    Theme(Option<Theme>),
    Lang(String),
    Doc { path: PathBuf, question: Option<String> },
    Models,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Say(line.to_owned());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let arg_opt = (!arg.is_empty()).then(|| arg.to_owned());
        match name {
            "continue" => Self::Continue,
            "export" => Self::Export(arg_opt.map(PathBuf::from)),
            "clear" => Self::Clear,
            "system" => Self::System(arg.to_owned()),
            "theme" => Self::Theme(Theme::parse(arg)),
            "lang" => Self::Lang(arg.to_owned()),
            "doc" if !arg.is_empty() => {
                let (path, question) = match arg.split_once(char::is_whitespace) {
                    Some((path, q)) => (path, Some(q.trim().to_owned())),
                    None => (arg, None),
                };
                Self::Doc {
                    path: PathBuf::from(path),
                    question,
                }
            }
            "models" => Self::Models,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(name.to_owned()),
        }
    }
}

/// Pass the configured thread count to the inference runtime's worker pool.
fn apply_thread_hint(threads: usize) {
    if threads == 0 || std::env::var_os("RAYON_NUM_THREADS").is_some() {
        return;
    }
    // SAFETY: runs in `main` before the tokio runtime or the log writer
    // thread exist, so no other thread can read the environment concurrently.
    unsafe { std::env::set_var("RAYON_NUM_THREADS", threads.to_string()) };
}

fn init_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    let file = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("companion-chat")
        .filename_suffix("log")
        .build(companion_dirs::logs_dir());
    match file {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            warn!(error = %e, "file logging disabled");
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config_path = CompanionConfig::default_config_path();
    let config = CompanionConfig::load_or_default(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;

    apply_thread_hint(config.model.threads);
    let _log_guard = init_logging();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(run(config))
}

fn render(event: &ChatEvent, state: &AppState) {
    match event {
        ChatEvent::Thinking => println!("  {}", state.translate("thinking")),
        ChatEvent::AssistantMessage(m) => println!("\n{}\n", m.content),
        ChatEvent::AssistantUpdated(m) => println!("\n{}\n", m.content),
        ChatEvent::ContextReset(m) => println!("\n{}\n", m.content),
        ChatEvent::Error(text) => eprintln!("{text}"),
        ChatEvent::UserMessage(_)
        | ChatEvent::ThinkingDone
        | ChatEvent::UserMessageDiscarded(_) => {}
    }
}

/// Run `turn` while rendering the events it produces.
async fn drive<T>(
    turn: impl std::future::Future<Output = T>,
    events: &mut mpsc::UnboundedReceiver<ChatEvent>,
    state: &AppState,
) -> T {
    tokio::pin!(turn);
    loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => render(&event, state),
            outcome = &mut turn => {
                while let Ok(event) = events.try_recv() {
                    render(&event, state);
                }
                return outcome;
            }
        }
    }
}

async fn save_settings(store: &dyn MessageStore, settings: &Settings, state: &AppState) {
    match store.update_settings(settings).await {
        Ok(()) => println!("{}", state.translate("settings_saved")),
        Err(e) => eprintln!("Error: {e}"),
    }
}

async fn run(config: CompanionConfig) -> anyhow::Result<()> {
    let state = AppState::shared();
    let store: Arc<dyn MessageStore> = Arc::new(
        SqliteStore::open(&config.storage.database_path).context("opening message store")?,
    );
    let mut settings = match state.load_settings(store.as_ref()).await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "settings unreadable, using defaults");
            Settings::default()
        }
    };

    let adapter = Arc::new(
        InferenceAdapter::new(config.model.clone(), &config.chat).with_state(Arc::clone(&state)),
    );
    adapter.set_system_prompt(&settings.system_prompt);

    println!("{}", state.translate("app_title"));
    println!("{}", state.status_label());
    adapter.initialize().await;
    println!("{}", state.status_label());

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let controller = ConversationController::new(
        config.chat.conversation_id,
        Arc::clone(&adapter),
        Arc::clone(&store),
        Arc::new(LogNotifier),
        Arc::clone(&state),
    )
    .with_events(events_tx);

    let loaded = controller.load_messages().await.context("loading history")?;
    for message in controller.messages() {
        println!("{}: {}", message.role, message.content);
    }
    info!(messages = loaded, "chat ready");
    println!("{HELP}\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Say(text) => {
                if let TurnOutcome::Failed(reason) =
                    drive(controller.submit(&text), &mut events, &state).await
                {
                    warn!(%reason, "turn failed");
                }
            }
            Command::Continue => {
                if drive(controller.continue_last(), &mut events, &state).await
                    == ContinueOutcome::Ignored
                {
                    println!("{}", state.translate("nothing_to_continue"));
                }
            }
            Command::Export(path) => {
                let path = path.unwrap_or_else(|| config.storage.export_path.clone());
                let written = async {
                    let doc = store
                        .export_conversation_json(controller.conversation_id())
                        .await?;
                    store::write_export(&doc, &path)
                }
                .await;
                match written {
                    Ok(()) => println!("{} {}", state.translate("exported_to"), path.display()),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            Command::Clear => match store.clear_all_messages().await {
                Ok(()) => {
                    controller.reset();
                    println!("{}", state.translate("history_cleared"));
                }
                Err(e) => eprintln!("Error: {e}"),
            },
            Command::System(prompt) => {
                adapter.set_system_prompt(&prompt);
                settings.system_prompt = prompt;
                save_settings(store.as_ref(), &settings, &state).await;
            }
            Command::Theme(Some(theme)) => {
                state.set_theme(theme);
                settings.theme = theme;
                save_settings(store.as_ref(), &settings, &state).await;
            }
            Command::Theme(None) => println!("usage: /theme <light|dark|system>"),
            Command::Lang(lang) => {
                let lang = if lang.is_empty() {
                    store::AUTO_LANGUAGE.to_owned()
                } else {
                    lang
                };
                state.set_language(&lang);
                settings.language = lang;
                save_settings(store.as_ref(), &settings, &state).await;
            }
            Command::Doc { path, question } => match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    println!("  {}", state.translate("thinking"));
                    match adapter.analyze_document(&content, question.as_deref()).await {
                        Generation::Reply(text) | Generation::Error(text) => println!("\n{text}\n"),
                        Generation::ContextLimitExceeded => {
                            eprintln!("{}", state.translate("context_limit_error"));
                        }
                    }
                }
                Err(e) => eprintln!("Error: {}: {e}", path.display()),
            },
            Command::Models => {
                let models = adapter.available_models();
                if models.is_empty() {
                    println!("(no model at {})", config.model.path.display());
                }
                for model in models {
                    println!("{model}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(name) => println!("unknown command /{name}, try /help"),
        }
    }

    info!("chat closed");
    Ok(())
}
