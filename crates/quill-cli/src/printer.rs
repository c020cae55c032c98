//! Render chat events to a terminal

use std::io::{self, Write};

use quill_chat::{ChatEvent, MessageId, Role, TurnState, TurnStatus};
use tokio::sync::broadcast::{self, error::TryRecvError};

const THINKING: &str = "bot: …";

/// Turns the controller's event stream into incremental terminal output.
///
/// Only characters not yet printed for the revealing message are written,
/// so a reveal shows up as a typewriter effect on a single line.
pub struct Printer {
    is_tty: bool,
    current: Option<(MessageId, usize)>,
    thinking: bool,
    last_status: Option<TurnStatus>,
}

impl Printer {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            current: None,
            thinking: false,
            last_status: None,
        }
    }

    /// Status of the most recently finished turn
    pub fn last_status(&self) -> Option<TurnStatus> {
        self.last_status
    }

    /// Handle every event already queued on `rx`
    pub fn drain(
        &mut self,
        rx: &mut broadcast::Receiver<ChatEvent>,
        out: &mut impl Write,
    ) -> io::Result<()> {
        loop {
            match rx.try_recv() {
                Ok(event) => self.handle(&event, out)?,
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!("Display fell behind by {} events", n);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        out.flush()
    }

    pub fn handle(&mut self, event: &ChatEvent, out: &mut impl Write) -> io::Result<()> {
        match event {
            ChatEvent::StateChanged {
                state: TurnState::AwaitingReply,
            } => {
                self.end_line(out)?;
                if self.is_tty {
                    write!(out, "{}", THINKING)?;
                    self.thinking = true;
                }
            }
            ChatEvent::MessageAppended { message } if message.role == Role::Assistant => {
                self.clear_thinking(out)?;
                self.end_line(out)?;
                write!(out, "bot: {}", message.content)?;
                if message.content.is_empty() {
                    self.current = Some((message.id, 0));
                } else {
                    // Error text arrives complete
                    writeln!(out)?;
                }
            }
            ChatEvent::ContentUpdated { id, content } => {
                match self.current.as_mut() {
                    Some((current, printed)) if current == id => {
                        let new_text: String = content.chars().skip(*printed).collect();
                        write!(out, "{}", new_text)?;
                        *printed += new_text.chars().count();
                    }
                    _ => {}
                }
            }
            ChatEvent::RevealStateChanged {
                id,
                revealing: false,
            } => {
                if matches!(self.current, Some((current, _)) if current == *id) {
                    self.end_line(out)?;
                }
            }
            ChatEvent::TurnFinished {
                assistant_id,
                status,
            } => {
                self.clear_thinking(out)?;
                if matches!(self.current, Some((current, _)) if current == *assistant_id) {
                    self.end_line(out)?;
                }
                self.last_status = Some(*status);
            }
            ChatEvent::TurnFailed { error } => {
                tracing::debug!("Turn failed: {}", error);
            }
            ChatEvent::Cleared => {
                self.clear_thinking(out)?;
                self.end_line(out)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn end_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.current.take().is_some() {
            writeln!(out)?;
        }
        Ok(())
    }

    fn clear_thinking(&mut self, out: &mut impl Write) -> io::Result<()> {
        if std::mem::take(&mut self.thinking) {
            // Return to column 0 and erase the indicator
            write!(out, "\r\x1b[2K")?;
        }
        Ok(())
    }
}
