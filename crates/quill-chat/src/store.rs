//! Ordered message store with change notification

use crate::{
    error::StoreError,
    message::{Message, MessageId, Role},
};

/// What changed in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// A message was appended at the end
    Appended(MessageId),
    /// A message's content was replaced
    ContentUpdated(MessageId),
    /// A message's reveal flag flipped
    RevealChanged { id: MessageId, revealing: bool },
    /// The whole conversation was emptied
    Cleared,
}

/// Observer notified synchronously after every store mutation.
///
/// Receives the full conversation as it stands after the change.
pub trait StoreSubscriber: Send {
    fn notify(&mut self, change: StoreChange, messages: &[Message]);
}

/// The conversation: append-only apart from a wholesale clear.
///
/// Ids are strictly increasing, so lookups are binary searches.
#[derive(Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    subscribers: Vec<Box<dyn StoreSubscriber>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with already-validated history (no notification)
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            subscribers: Vec::new(),
        }
    }

    /// Register an observer
    pub fn subscribe(&mut self, subscriber: Box<dyn StoreSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Append a message at the end
    pub fn append(&mut self, message: Message) -> Result<MessageId, StoreError> {
        if let Some(last) = self.messages.last() {
            if message.id <= last.id {
                return Err(StoreError::InvalidMessage(format!(
                    "id {} does not follow last id {}",
                    message.id, last.id
                )));
            }
        }
        if message.revealing {
            if message.role == Role::User {
                return Err(StoreError::InvalidMessage(
                    "user messages cannot be revealing".into(),
                ));
            }
            if let Some(active) = self.revealing() {
                return Err(StoreError::InvalidMessage(format!(
                    "message {} is already revealing",
                    active.id
                )));
            }
        }

        let id = message.id;
        self.messages.push(message);
        self.notify(StoreChange::Appended(id));
        Ok(id)
    }

    /// Replace the content of an assistant message
    pub fn update_content(
        &mut self,
        id: MessageId,
        content: impl Into<String>,
    ) -> Result<(), StoreError> {
        let idx = self.index_of(id)?;
        let message = &mut self.messages[idx];
        if message.role == Role::User {
            return Err(StoreError::InvalidMessage(format!(
                "content of user message {} is immutable",
                id
            )));
        }
        message.content = content.into();
        self.notify(StoreChange::ContentUpdated(id));
        Ok(())
    }

    /// Flip the reveal flag, keeping at most one message revealing
    pub fn set_revealing(&mut self, id: MessageId, revealing: bool) -> Result<(), StoreError> {
        let idx = self.index_of(id)?;
        if self.messages[idx].revealing == revealing {
            return Ok(());
        }
        if revealing {
            if self.messages[idx].role == Role::User {
                return Err(StoreError::InvalidMessage(
                    "user messages cannot be revealing".into(),
                ));
            }
            if let Some(active) = self.revealing() {
                return Err(StoreError::InvalidMessage(format!(
                    "message {} is already revealing",
                    active.id
                )));
            }
        }

        self.messages[idx].revealing = revealing;
        self.notify(StoreChange::RevealChanged { id, revealing });
        Ok(())
    }

    /// Empty the conversation
    pub fn clear(&mut self) {
        self.messages.clear();
        self.notify(StoreChange::Cleared);
    }

    /// Ordered read-only view of the conversation
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.index_of(id).ok().map(|idx| &self.messages[idx])
    }

    /// The message currently being revealed, if any
    pub fn revealing(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.revealing)
    }

    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn index_of(&self, id: MessageId) -> Result<usize, StoreError> {
        self.messages
            .binary_search_by_key(&id, |m| m.id)
            .map_err(|_| StoreError::NotFound(id))
    }

    fn notify(&mut self, change: StoreChange) {
        for subscriber in &mut self.subscribers {
            subscriber.notify(change, &self.messages);
        }
    }
}
