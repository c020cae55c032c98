//! HTTP client for the relay endpoint

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    types::{ChatReply, ChatRequest, DEFAULT_FALLBACK_REPLY},
};

/// Something that can carry one user message to the completion service
#[async_trait]
pub trait Relay: Send + Sync {
    /// Send `text` and wait for the reply text
    async fn send(&self, text: &str) -> Result<String>;
}

/// Relay client configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Full URL of the chat endpoint
    pub url: String,
    /// Overall request timeout
    pub timeout: Duration,
    /// Reply used when a successful response carries no `reply` field
    pub fallback_reply: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/chat".to_string(),
            timeout: Duration::from_secs(30),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

/// reqwest-backed relay client
pub struct RelayClient {
    client: reqwest::Client,
    config: RelayConfig,
}

impl RelayClient {
    /// Create a client, validating the endpoint URL
    pub fn new(config: RelayConfig) -> Result<Self> {
        reqwest::Url::parse(&config.url)
            .map_err(|e| Error::InvalidConfig(format!("relay url '{}': {}", config.url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// The endpoint this client posts to
    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl Relay for RelayClient {
    async fn send(&self, text: &str) -> Result<String> {
        tracing::debug!("POST {} ({} chars)", self.config.url, text.chars().count());

        let response = self
            .client
            .post(&self.config.url)
            .json(&ChatRequest { message: text })
            .send()
            .await
            .map_err(Error::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Relay answered {}", status);
            return Err(Error::status(status.as_u16(), &body));
        }

        let body = response.bytes().await.map_err(Error::transport)?;
        let reply: ChatReply = serde_json::from_slice(&body)?;
        if reply.reply.is_none() {
            tracing::debug!("Relay reply had no text, using fallback");
        }

        Ok(reply.into_text(&self.config.fallback_reply))
    }
}
