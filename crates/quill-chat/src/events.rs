//! Chat event types

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    controller::{TurnState, TurnStatus},
    message::{Message, MessageId},
    store::{StoreChange, StoreSubscriber},
};

/// Events emitted while the conversation changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was added to the conversation
    MessageAppended { message: Message },

    /// A message's content changed (one reveal step)
    ContentUpdated { id: MessageId, content: String },

    /// A message started or stopped revealing
    RevealStateChanged { id: MessageId, revealing: bool },

    /// The conversation was emptied
    Cleared,

    /// The controller moved to a new state
    StateChanged { state: TurnState },

    /// The relay request of a turn failed
    TurnFailed { error: String },

    /// A turn reached its final status
    TurnFinished {
        assistant_id: MessageId,
        status: TurnStatus,
    },
}

/// Store subscriber that republishes store changes as [`ChatEvent`]s
pub struct EventPublisher {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventPublisher {
    pub fn new(tx: broadcast::Sender<ChatEvent>) -> Self {
        Self { tx }
    }
}

impl StoreSubscriber for EventPublisher {
    fn notify(&mut self, change: StoreChange, messages: &[Message]) {
        let find = |id: MessageId| messages.iter().rev().find(|m| m.id == id);

        let event = match change {
            StoreChange::Appended(id) => find(id).map(|m| ChatEvent::MessageAppended {
                message: m.clone(),
            }),
            StoreChange::ContentUpdated(id) => find(id).map(|m| ChatEvent::ContentUpdated {
                id,
                content: m.content.clone(),
            }),
            StoreChange::RevealChanged { id, revealing } => {
                Some(ChatEvent::RevealStateChanged { id, revealing })
            }
            StoreChange::Cleared => Some(ChatEvent::Cleared),
        };

        // No receivers is fine
        if let Some(event) = event {
            let _ = self.tx.send(event);
        }
    }
}
