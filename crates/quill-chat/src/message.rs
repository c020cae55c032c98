//! Message model and id assignment

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque message identifier, strictly increasing in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn's content.
///
/// Persisted as `{"id", "role", "content"}`; the reveal flag only exists in
/// memory, so a reloaded conversation never has a message mid-reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// True while the reveal scheduler owns `content`
    #[serde(skip)]
    pub revealing: bool,
}

impl Message {
    /// Create a user message
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            revealing: false,
        }
    }

    /// Create an assistant message with fixed content
    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            revealing: false,
        }
    }

    /// Create the empty assistant message a reveal writes into
    pub fn placeholder(id: MessageId) -> Self {
        Self::assistant(id, String::new())
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Hands out message ids.
///
/// Ids are wall-clock milliseconds, bumped past the previous id whenever the
/// clock would not move forward (same millisecond, clock skew, or ids loaded
/// from a snapshot written "in the future").
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    /// Start after the given id (typically the last persisted message)
    pub fn after(last: Option<MessageId>) -> Self {
        Self {
            last: last.map(|id| id.0).unwrap_or(0),
        }
    }

    /// Next id, strictly greater than every id handed out before
    pub fn next_id(&mut self) -> MessageId {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let id = now.max(self.last.saturating_add(1));
        self.last = id;
        MessageId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape_omits_revealing() {
        let mut msg = Message::assistant(MessageId(7), "hello");
        msg.revealing = true;
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"id":7,"role":"assistant","content":"hello"}"#);
    }

    #[test]
    fn test_deserialize_resets_revealing() {
        let msg: Message =
            serde_json::from_str(r#"{"id":1,"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(msg, Message::user(MessageId(1), "hi"));
        assert!(!msg.revealing);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result =
            serde_json::from_str::<Message>(r#"{"id":1,"role":"system","content":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_text_content_rejected() {
        let result = serde_json::from_str::<Message>(r#"{"id":1,"role":"user","content":42}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut ids = IdGenerator::default();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_ids_continue_after_future_id() {
        let far_future = MessageId(u64::MAX / 2);
        let mut ids = IdGenerator::after(Some(far_future));
        assert_eq!(ids.next_id(), MessageId(u64::MAX / 2 + 1));
    }
}
