//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_chat::{ControllerConfig, DEFAULT_ERROR_TEXT, FileSlot, RevealConfig};
use quill_relay::{DEFAULT_FALLBACK_REPLY, RelayConfig};

/// Default relay endpoint
pub const DEFAULT_RELAY_URL: &str = "http://localhost:3000/chat";

/// Configuration for quill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay endpoint receiving `{"message": ...}`
    pub relay_url: Option<String>,
    /// Request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Characters revealed per step
    pub chunk_size: Option<usize>,
    /// Milliseconds between reveal steps
    pub delay_ms: Option<u64>,
    /// Assistant text shown when the relay cannot be reached
    pub error_text: Option<String>,
    /// Reply used when the relay answers without one
    pub fallback_reply: Option<String>,
    /// Directory holding the conversation history
    pub storage_dir: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quill")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("QUILL_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            relay_url: Some(DEFAULT_RELAY_URL.to_string()),
            request_timeout_secs: Some(30),
            chunk_size: Some(1),
            delay_ms: Some(25),
            error_text: None,
            fallback_reply: None,
            storage_dir: None,
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// Relay client settings
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            url: self
                .relay_url
                .clone()
                .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string()),
            timeout: Duration::from_secs(self.request_timeout_secs.unwrap_or(30)),
            fallback_reply: self
                .fallback_reply
                .clone()
                .unwrap_or_else(|| DEFAULT_FALLBACK_REPLY.to_string()),
        }
    }

    /// Controller settings; unset reveal fields keep `base`'s values
    pub fn controller_config(&self, base: RevealConfig) -> ControllerConfig {
        ControllerConfig {
            reveal: RevealConfig {
                chunk_size: self.chunk_size.unwrap_or(base.chunk_size).max(1),
                delay: self
                    .delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(base.delay),
            },
            error_text: self
                .error_text
                .clone()
                .unwrap_or_else(|| DEFAULT_ERROR_TEXT.to_string()),
        }
    }

    /// Where the history lives
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(FileSlot::default_dir)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# quill configuration file
# Place at ~/.config/quill/config.toml (Linux/Mac) or %APPDATA%\quill\config.toml (Windows)

# Relay endpoint; receives {"message": "..."} and answers {"reply": "..."}
relay_url = "http://localhost:3000/chat"

# Give up on the relay after this many seconds
request_timeout_secs = 30

# Typewriter pacing: characters per step and milliseconds between steps
# (chunk_size = 24 with delay_ms = 28 reveals long replies faster)
chunk_size = 1
delay_ms = 25

# Assistant text shown when the relay cannot be reached (optional)
# error_text = "⚠️ Could not reach the server."

# Reply used when the relay answers without a "reply" field (optional)
# fallback_reply = "no reply available"

# Directory holding the conversation history (optional)
# storage_dir = "~/.local/share/quill"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.relay_url.as_deref(), Some(DEFAULT_RELAY_URL));
        assert_eq!(config.chunk_size, Some(1));
        assert_eq!(config.delay_ms, Some(25));
        assert_eq!(config.error_text, None);
    }

    #[test]
    fn test_defaults_when_empty() {
        let config: Config = toml::from_str("").unwrap();
        let relay = config.relay_config();
        assert_eq!(relay.url, DEFAULT_RELAY_URL);
        assert_eq!(relay.timeout, Duration::from_secs(30));
        assert_eq!(relay.fallback_reply, "no reply available");

        let controller = config.controller_config(RevealConfig::default());
        assert_eq!(controller.reveal, RevealConfig::default());
        assert_eq!(controller.error_text, DEFAULT_ERROR_TEXT);
    }

    #[test]
    fn test_file_values_override_base_reveal() {
        let config = Config {
            chunk_size: Some(0),
            delay_ms: Some(40),
            ..Config::default()
        };
        let controller = config.controller_config(RevealConfig::batched());
        assert_eq!(controller.reveal.chunk_size, 1);
        assert_eq!(controller.reveal.delay, Duration::from_millis(40));

        let untouched = Config::default().controller_config(RevealConfig::batched());
        assert_eq!(untouched.reveal, RevealConfig::batched());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let config = Config {
            relay_url: Some("http://relay.local/chat".into()),
            storage_dir: Some("/tmp/quill".into()),
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/quill"));
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "relay_url = [").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        assert_eq!(
            Config::load_from(&dir.path().join("missing.toml")),
            Config::default()
        );
    }
}
