//! `sagechat chat` — Interactive or single-message chat mode.

use std::io::Write;

use sagechat_agent::{Orchestrator, TurnOutcome, TurnSettings, restore_log, seed_log};
use sagechat_config::AppConfig;
use sagechat_core::error::TurnError;
use sagechat_core::message::{Message, MessageId, Role};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{build_store, load_config};

pub async fn run(
    message: Option<String>,
    web: bool,
    no_critique: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    // Check for API key early to give a clear error
    if !config.has_api_key() && config.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    SILICONFLOW_API_KEY=sk-...   (default provider)");
        eprintln!("    OPENAI_API_KEY=sk-...        (for OpenAI direct)");
        eprintln!("    SAGECHAT_API_KEY=sk-...      (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let orchestrator = build_orchestrator(&config, web, no_critique).await;

    if let Some(msg) = message {
        // Single message mode
        let outcome = run_turn(&orchestrator, &msg).await?;
        if outcome == Some(TurnOutcome::Failed) {
            return Err("The model request failed".into());
        }
        return Ok(());
    }

    print_banner(&config, &orchestrator);
    print_history(&orchestrator.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/exit" | "/quit" | "exit" => break,
            "/help" => print_help(),
            "/web" => {
                let enabled = !orchestrator.augmentation_enabled();
                orchestrator.set_augmentation(enabled);
                println!("  Web search: {}", on_off(enabled));
                if enabled && !orchestrator.search_available() {
                    println!("  (no [search].endpoint configured; questions are sent as-is)");
                }
            }
            "/critique" => {
                let enabled = !orchestrator.critique_enabled();
                orchestrator.set_critique(enabled);
                println!("  Critique: {}", on_off(enabled));
            }
            "/history" => print_history(&orchestrator.snapshot()),
            "/clear" => match orchestrator.clear().await {
                Ok(()) => println!("  Conversation cleared."),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            text => {
                run_turn(&orchestrator, text).await?;
            }
        }
        println!();
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}

async fn build_orchestrator(config: &AppConfig, web: bool, no_critique: bool) -> Orchestrator {
    let provider = sagechat_providers::build_provider(config);
    let store = build_store(&config.storage);
    let session = config.storage.session_key.clone();

    let restored = restore_log(store.as_ref(), &session).await;
    let log = seed_log(restored, config.greeting.as_deref());

    let mut orchestrator = Orchestrator::new(provider, TurnSettings::from_config(config))
        .with_log(log)
        .with_store(store, session)
        .with_augmentation(web || config.search.enabled)
        .with_critique(config.critique.enabled && !no_critique);

    if let Some(search) = sagechat_providers::build_search(config) {
        orchestrator = orchestrator.with_search(search);
    }
    orchestrator
}

/// Run one turn, streaming new text to stdout as it lands in the log.
///
/// Ctrl+C cancels the turn; the partial answer stays in the log.
async fn run_turn(
    orchestrator: &Orchestrator,
    text: &str,
) -> Result<Option<TurnOutcome>, Box<dyn std::error::Error>> {
    let mut snapshots = orchestrator.subscribe();
    let mut renderer = Renderer::after(orchestrator.snapshot().last().map(|m| m.id));

    let turn = orchestrator.submit(text);
    tokio::pin!(turn);

    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            changed = snapshots.changed() => {
                if changed.is_ok() {
                    let snapshot = snapshots.borrow_and_update().clone();
                    emit(&renderer.update(&snapshot))?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                orchestrator.cancel();
            }
        }
    };
    emit(&renderer.update(&orchestrator.snapshot()))?;

    match result {
        Ok(report) => {
            if report.outcome == TurnOutcome::Aborted {
                println!("\n  [Cancelled]");
            }
            Ok(Some(report.outcome))
        }
        Err(TurnError::Busy) => {
            eprintln!("  [Busy] A turn is already running.");
            Ok(None)
        }
        Err(TurnError::EmptyInput) => Ok(None),
    }
}

fn emit(text: &str) -> std::io::Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}

/// Turns successive log snapshots into the text not yet printed.
///
/// User messages are never echoed; assistant and critic messages newer than
/// the starting point are printed once, growing as deltas arrive.
#[derive(Debug, Default)]
struct Renderer {
    /// Messages at or below this id are already on screen.
    floor: Option<MessageId>,
    /// The message being printed and how many bytes of it are out.
    current: Option<(MessageId, usize)>,
}

impl Renderer {
    fn after(floor: Option<MessageId>) -> Self {
        Self {
            floor,
            current: None,
        }
    }

    fn update(&mut self, snapshot: &[Message]) -> String {
        let mut out = String::new();
        for message in snapshot {
            if message.role == Role::User || self.floor.is_some_and(|f| message.id <= f) {
                continue;
            }

            let printed = match self.current {
                Some((id, printed)) if id == message.id => printed,
                _ => {
                    out.push_str(&format!("\n  {} > ", label(message.role)));
                    0
                }
            };
            if let Some(rest) = message.content.get(printed..) {
                out.push_str(rest);
            }
            self.current = Some((message.id, message.content.len()));

            if !message.is_open() {
                out.push('\n');
                self.floor = Some(message.id);
                self.current = None;
            }
        }
        out
    }
}

fn label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::Critic => "Critic",
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn print_banner(config: &AppConfig, orchestrator: &Orchestrator) {
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        SageChat — Interactive Mode           ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.provider);
    println!("  Model:     {}", config.model);
    println!("  Search:    {}", on_off(orchestrator.augmentation_enabled()));
    println!("  Critique:  {}", on_off(orchestrator.critique_enabled()));
    println!("  Session:   {} ({})", config.storage.session_key, config.storage.backend);
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!("  Ctrl+C cancels a running answer; /exit quits.");
    println!();
}

fn print_help() {
    println!("  /web       Toggle web search augmentation");
    println!("  /critique  Toggle the critique pass");
    println!("  /history   Show the conversation so far");
    println!("  /clear     Delete the conversation");
    println!("  /exit      Quit");
}

fn print_history(snapshot: &[Message]) {
    if snapshot.is_empty() {
        return;
    }
    for message in snapshot {
        println!("  {} > {}", label(message.role), message.content);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sagechat_core::message::ConversationLog;

    fn log_with_answer(content: &str) -> (ConversationLog, Option<MessageId>) {
        let mut log = ConversationLog::new();
        let floor = log.push_frozen(Role::Assistant, "你好！");
        log.push_user("为什么NLU重要");
        let handle = log.open(Role::Assistant);
        log.append(handle, content).unwrap();
        log.freeze(handle).unwrap();
        (log, Some(floor))
    }

    #[test]
    fn renderer_prints_only_new_suffix() {
        let mut renderer = Renderer::after(None);
        let mut log = ConversationLog::new();
        log.push_user("q");
        let handle = log.open(Role::Assistant);

        log.append(handle, "N").unwrap();
        assert_eq!(renderer.update(log.messages()), "\n  Assistant > N");

        log.append(handle, "LU是...").unwrap();
        assert_eq!(renderer.update(log.messages()), "LU是...");
        assert_eq!(renderer.update(log.messages()), "");

        log.append(handle, "...重要。").unwrap();
        log.freeze(handle).unwrap();
        assert_eq!(renderer.update(log.messages()), "...重要。\n");
        assert_eq!(renderer.update(log.messages()), "");
    }

    #[test]
    fn renderer_skips_messages_already_shown() {
        let (log, floor) = log_with_answer("NLU");
        let mut renderer = Renderer::after(floor);
        assert_eq!(renderer.update(log.messages()), "\n  Assistant > NLU\n");
    }

    #[test]
    fn renderer_labels_critic_output() {
        let (mut log, floor) = log_with_answer("answer");
        let mut renderer = Renderer::after(floor);
        renderer.update(log.messages());

        let critic = log.open(Role::Critic);
        log.append(critic, "补充").unwrap();
        assert_eq!(renderer.update(log.messages()), "\n  Critic > 补充");
    }

    #[test]
    fn renderer_catches_up_after_skipped_snapshots() {
        let (mut log, floor) = log_with_answer("partial");
        let mut renderer = Renderer::after(floor);
        log.push_frozen(Role::Critic, "late");
        let out = renderer.update(log.messages());
        assert_eq!(out, "\n  Assistant > partial\n\n  Critic > late\n");
    }
}
