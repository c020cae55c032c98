//! /history command - show the stored conversation

use super::CommandResult;
use quill_chat::{Message, Role};

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn execute(args: &str, messages: &[Message]) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(format_history(messages));
        }

        match args.parse::<usize>() {
            Ok(n) => {
                let start = messages.len().saturating_sub(n);
                CommandResult::Message(format_history(&messages[start..]))
            }
            Err(_) => CommandResult::Message(format!(
                "Invalid count '{}'. Usage: /history [n]",
                args
            )),
        }
    }
}

/// Render messages as a transcript, one block per message
pub fn format_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No messages yet.".to_string();
    }

    let mut output = String::new();
    for (i, message) in messages.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        let label = match message.role {
            Role::User => "you",
            Role::Assistant => "bot",
        };
        output.push_str(&format!("{:>3}: {}", label, message.content));
    }
    output
}
