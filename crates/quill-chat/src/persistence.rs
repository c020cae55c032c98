//! Durable snapshot of the conversation
//!
//! The whole conversation is written to a single key after every mutation
//! that affects its persisted form. Reads degrade to "no history" on any
//! problem; a broken snapshot is never surfaced to the user.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    error::Result,
    message::Message,
    store::{StoreChange, StoreSubscriber},
};

/// Key the conversation is stored under
pub const HISTORY_KEY: &str = "chat-history";

/// A durable key-value slot
pub trait Slot: Send {
    /// Read the value under `key`; `None` when nothing was ever written
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    /// Overwrite the value under `key`
    fn write(&mut self, key: &str, value: &str) -> io::Result<()>;
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default data directory (`<data_local_dir>/quill`)
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quill")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Default for FileSlot {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl Slot for FileSlot {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write-then-rename so a crash never leaves a half-written snapshot
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    writes: usize,
}

/// In-memory slot. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key
    pub fn with_value(key: &str, value: impl Into<String>) -> Self {
        let slot = Self::new();
        slot.inner.lock().values.insert(key.to_string(), value.into());
        slot
    }

    /// Current raw value under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().values.get(key).cloned()
    }

    /// Number of writes performed so far
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }
}

impl Slot for MemorySlot {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&mut self, key: &str, value: &str) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.values.insert(key.to_string(), value.to_string());
        inner.writes += 1;
        Ok(())
    }
}

/// Loads and saves the conversation snapshot
pub struct Persistence {
    slot: Box<dyn Slot>,
    key: String,
}

impl Persistence {
    /// Persist under [`HISTORY_KEY`]
    pub fn new(slot: impl Slot + 'static) -> Self {
        Self::with_key(slot, HISTORY_KEY)
    }

    pub fn with_key(slot: impl Slot + 'static, key: impl Into<String>) -> Self {
        Self {
            slot: Box::new(slot),
            key: key.into(),
        }
    }

    /// Read the stored conversation.
    ///
    /// Missing, unreadable or malformed data yields an empty conversation.
    pub fn load(&self) -> Vec<Message> {
        let raw = match self.slot.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read '{}', starting fresh: {}", self.key, e);
                return Vec::new();
            }
        };

        match parse_snapshot(&raw) {
            Some(messages) => {
                tracing::debug!("Loaded {} messages from '{}'", messages.len(), self.key);
                messages
            }
            None => {
                tracing::warn!("Ignoring malformed history under '{}'", self.key);
                Vec::new()
            }
        }
    }

    /// Overwrite the slot with the full conversation
    pub fn save(&mut self, messages: &[Message]) -> Result<()> {
        let json = serde_json::to_string(messages)?;
        self.slot.write(&self.key, &json)?;
        Ok(())
    }
}

impl StoreSubscriber for Persistence {
    fn notify(&mut self, change: StoreChange, messages: &[Message]) {
        // The reveal flag is not part of the snapshot
        if let StoreChange::RevealChanged { .. } = change {
            return;
        }
        if let Err(e) = self.save(messages) {
            tracing::warn!("Failed to save history after {:?}: {}", change, e);
        }
    }
}

/// Largest id a millisecond clock can produce; anything above leaves the
/// id generator no room to continue
const MAX_STORED_ID: u64 = i64::MAX as u64;

/// Parse a stored snapshot, rejecting anything that is not a valid conversation
fn parse_snapshot(raw: &str) -> Option<Vec<Message>> {
    let messages: Vec<Message> = serde_json::from_str(raw).ok()?;
    let ordered = messages.windows(2).all(|w| w[0].id < w[1].id);
    let in_range = messages.last().is_none_or(|m| m.id.0 <= MAX_STORED_ID);
    (ordered && in_range).then_some(messages)
}
