use std::borrow::Cow::{self, Borrowed, Owned};
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing_subscriber::EnvFilter;

use copilot_core::AppConfig;
use copilot_core::session::{HealthStatus, Message, MessageRole, SessionState};
use copilot_interaction::{ApiClient, ChatSession, IgnoreReason, SendOutcome};

const COMMANDS: &[&str] = &["/clear", "/suggest", "/use", "/status", "/quit"];

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn is_command(&self, word: &str) -> bool {
        self.commands.iter().any(|cmd| cmd == word)
    }

    fn matching<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.commands.iter().filter(move |cmd| cmd.starts_with(prefix))
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return Ok((0, vec![]));
        }

        let candidates = self
            .matching(line)
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: cmd.clone(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if !line.starts_with('/') {
            return Borrowed(line);
        }
        let command = line.split_whitespace().next().unwrap_or(line);
        if self.is_command(command) {
            Owned(line.bright_cyan().to_string())
        } else {
            Owned(line.yellow().to_string())
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        self.matching(line)
            .find(|cmd| cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Validator for CliHelper {}

/// A parsed line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Intent {
    Send(String),
    UseSuggestion(usize),
    ListSuggestions,
    Clear,
    Status,
    Quit,
    Unknown(String),
}

fn parse_intent(line: &str) -> Intent {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        return match trimmed {
            "quit" | "exit" => Intent::Quit,
            _ => Intent::Send(trimmed.to_string()),
        };
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("clear"), None) => Intent::Clear,
        (Some("suggest"), None) => Intent::ListSuggestions,
        (Some("status"), None) => Intent::Status,
        (Some("quit" | "exit"), None) => Intent::Quit,
        (Some("use"), Some(n)) => match n.parse::<usize>() {
            Ok(n) if n >= 1 => Intent::UseSuggestion(n - 1),
            _ => Intent::Unknown(trimmed.to_string()),
        },
        _ => Intent::Unknown(trimmed.to_string()),
    }
}

fn print_status(health: HealthStatus, api_base: &str) {
    let status = match health {
        HealthStatus::Ok => "ok".bright_green(),
        HealthStatus::Unavailable => "unavailable".bright_red(),
        HealthStatus::Unknown => "checking...".bright_black(),
    };
    println!("Service status: {} • API: {}", status, api_base.bright_black());
}

fn print_suggestions(suggestions: &[String]) {
    if suggestions.is_empty() {
        println!("{}", "No suggestions available.".bright_black());
        return;
    }
    println!("{}", "Suggestions:".bright_yellow());
    for (i, s) in suggestions.iter().enumerate() {
        println!("  {}", format!("{}. {}", i + 1, s).yellow());
    }
}

fn print_message(message: &Message) {
    match message.role {
        MessageRole::Assistant => {
            for line in message.content.lines() {
                println!("{}", line.bright_blue());
            }
        }
        MessageRole::System => println!("{}", message.content.bright_black()),
        MessageRole::User => println!("{}", format!("> {}", message.content).green()),
    }
}

fn print_error(state: &SessionState) {
    if !state.error.is_empty() {
        println!("{}", format!("Error: {}", state.error).red());
    }
}

/// The main entry point for the Copilot readline REPL.
///
/// Resolves configuration once, mounts a chat session (health and
/// suggestion probes run in the background) and forwards user intents to it.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::install(AppConfig::load()?);
    let client = ApiClient::from_config(config);
    let api_base = client.api_base().to_string();
    let session = Arc::new(ChatSession::new(Arc::new(client)));

    println!("{}", "=== AI Copilot ===".bright_magenta().bold());
    println!(
        "{}",
        "Type a prompt, '/suggest' for ideas, '/use N' to send one, '/clear' to reset, or '/quit' to exit."
            .bright_black()
    );

    // Print the banner once the mount-time probes have landed.
    session.mount();
    let probe_session = Arc::clone(&session);
    let probe_api_base = api_base.clone();
    tokio::spawn(async move {
        probe_session.wait_for_probes().await;
        let state = probe_session.snapshot();
        print_status(state.health, &probe_api_base);
        if state.messages.is_empty() && !state.suggestions.is_empty() {
            print_suggestions(&state.suggestions);
        }
    });

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CliHelper::new()));

    loop {
        let line = match rl.readline(">> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{}", format!("Input error: {err}").red());
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        let outcome = match parse_intent(&line) {
            Intent::Quit => break,
            Intent::Clear => {
                if session.clear() {
                    println!("{}", "Conversation cleared.".bright_black());
                }
                continue;
            }
            Intent::Status => {
                let state = session.snapshot();
                print_status(state.health, &api_base);
                print_error(&state);
                continue;
            }
            Intent::ListSuggestions => {
                print_suggestions(&session.snapshot().suggestions);
                continue;
            }
            Intent::Unknown(command) => {
                println!("{}", format!("Unknown command: {command}").bright_black());
                continue;
            }
            Intent::UseSuggestion(index) => session.send_suggestion(index).await,
            Intent::Send(text) => session.send_message(&text).await,
        };

        match outcome {
            SendOutcome::Replied(reply) => print_message(&reply),
            SendOutcome::Failed(_) => {
                let state = session.snapshot();
                print_error(&state);
                if let Some(notice) = state.messages.last() {
                    print_message(notice);
                }
            }
            SendOutcome::Ignored(IgnoreReason::UnknownSuggestion) => {
                println!("{}", "No such suggestion; try /suggest.".bright_black());
            }
            SendOutcome::Ignored(IgnoreReason::Blank | IgnoreReason::Busy) => {}
        }
    }

    session.teardown().await;
    println!("{}", "Goodbye!".bright_green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_matches_command_prefixes() {
        let helper = CliHelper::new();
        let matches: Vec<_> = helper.matching("/s").collect();
        assert_eq!(matches, ["/suggest", "/status"]);
        assert!(helper.is_command("/use"));
        assert!(!helper.is_command("/us"));
    }

    #[test]
    fn test_parse_plain_text_is_send() {
        assert_eq!(parse_intent("  hello  "), Intent::Send("hello".into()));
        assert_eq!(parse_intent("exit"), Intent::Quit);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_intent("/clear"), Intent::Clear);
        assert_eq!(parse_intent("/suggest"), Intent::ListSuggestions);
        assert_eq!(parse_intent("/status"), Intent::Status);
        assert_eq!(parse_intent("/use 2"), Intent::UseSuggestion(1));
        assert_eq!(parse_intent("/use 0"), Intent::Unknown("/use 0".into()));
        assert_eq!(parse_intent("/plan"), Intent::Unknown("/plan".into()));
    }
}
