//! quill-chat: Conversation runtime
//!
//! This crate owns the single conversation thread: the ordered message store,
//! its persisted snapshot, the typewriter reveal of assistant replies, and the
//! controller that drives one turn at a time against a relay.

pub mod controller;
pub mod error;
pub mod events;
pub mod message;
pub mod persistence;
pub mod reveal;
pub mod store;

pub use controller::{
    ControllerConfig, ConversationController, DEFAULT_ERROR_TEXT, PendingTurn, SubmitOutcome,
    TurnState, TurnStatus,
};
pub use error::{Error, Result, StoreError};
pub use events::ChatEvent;
pub use message::{IdGenerator, Message, MessageId, Role};
pub use persistence::{FileSlot, HISTORY_KEY, MemorySlot, Persistence, Slot};
pub use reveal::{RevealConfig, RevealHandle, RevealScheduler, RevealStep};
pub use store::{MessageStore, StoreChange, StoreSubscriber};
