//! Wire types for the relay endpoint

use serde::{Deserialize, Serialize};

/// Text returned when the relay answers successfully but without a reply
pub const DEFAULT_FALLBACK_REPLY: &str = "no reply available";

/// Outbound request body: `{"message": "..."}`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
}

/// Success response body: `{"reply": "..."}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub reply: Option<String>,
}

impl ChatReply {
    /// The reply text, or `fallback` when the relay left the field out or null
    pub fn into_text(self, fallback: &str) -> String {
        self.reply.unwrap_or_else(|| fallback.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_string(&ChatRequest { message: "hi" }).unwrap();
        assert_eq!(body, r#"{"message":"hi"}"#);
    }

    #[test]
    fn test_reply_present() {
        let reply: ChatReply = serde_json::from_str(r#"{"reply":"hello there"}"#).unwrap();
        assert_eq!(reply.into_text(DEFAULT_FALLBACK_REPLY), "hello there");
    }

    #[test]
    fn test_reply_missing_uses_fallback() {
        let reply: ChatReply = serde_json::from_str(r#"{"other":1}"#).unwrap();
        assert_eq!(reply.into_text(DEFAULT_FALLBACK_REPLY), "no reply available");
    }

    #[test]
    fn test_reply_null_uses_fallback() {
        let reply: ChatReply = serde_json::from_str(r#"{"reply":null}"#).unwrap();
        assert_eq!(reply.into_text("fallback"), "fallback");
    }

    #[test]
    fn test_empty_reply_is_kept() {
        let reply: ChatReply = serde_json::from_str(r#"{"reply":""}"#).unwrap();
        assert_eq!(reply.into_text("fallback"), "");
    }
}
