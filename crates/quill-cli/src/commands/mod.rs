//! Slash commands for interactive mode

mod history;

pub use history::format_history;

use history::HistoryCommand;
use quill_chat::Message;

/// Result of executing a slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Clear the conversation
    Clear,
    /// Show a message to the user (not sent to the relay)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, messages: &[Message]) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "history" | "hist" => HistoryCommand::execute(args, messages),

        _ => CommandResult::Unknown(command),
    })
}

pub fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /history, /hist [n]    Show the conversation (or its last n messages)
  /clear, /c             Clear conversation history
  /quit, /exit, /q       Exit quill

Anything else is sent to the relay."#
        .to_string()
}
