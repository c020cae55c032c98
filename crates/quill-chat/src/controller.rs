//! Conversation controller: one turn at a time
//!
//! The controller owns the store, the reveal scheduler and the in-flight
//! relay request. Everything that mutates the conversation happens inside
//! its `&mut self` methods, so the request, the reveal timer and user input
//! interleave cooperatively without locks.

use std::sync::Arc;

use futures::future::BoxFuture;
use quill_relay::Relay;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    error::StoreError,
    events::{ChatEvent, EventPublisher},
    message::{IdGenerator, Message, MessageId},
    persistence::Persistence,
    reveal::{RevealConfig, RevealHandle, RevealScheduler},
    store::MessageStore,
};

/// Assistant text written when the relay request fails
pub const DEFAULT_ERROR_TEXT: &str = "⚠️ Could not reach the server.";

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Reveal pacing for assistant replies
    pub reveal: RevealConfig,
    /// Assistant text shown for a failed turn
    pub error_text: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reveal: RevealConfig::default(),
            error_text: DEFAULT_ERROR_TEXT.to_string(),
        }
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    AwaitingReply,
    Revealing,
    /// Transient: the error message is written and the controller returns to idle
    Failed,
}

/// Progress of the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Awaiting,
    Revealing,
    Done,
    Failed,
}

/// The turn in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    /// Text sent to the relay
    pub user_text: String,
    /// Id reserved for the assistant message receiving the result
    pub assistant_id: MessageId,
    pub status: TurnStatus,
}

/// What `submit` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A turn started
    Sent {
        user_id: MessageId,
        assistant_id: MessageId,
    },
    /// Empty or whitespace-only input; nothing happened
    Empty,
    /// A reply is still awaited; input ignored
    Busy,
}

type ReplyFuture = BoxFuture<'static, quill_relay::Result<String>>;

/// Drives the conversation
pub struct ConversationController {
    config: ControllerConfig,
    store: MessageStore,
    relay: Arc<dyn Relay>,
    reveal: RevealScheduler,
    reveal_handle: Option<RevealHandle>,
    state: TurnState,
    pending: Option<PendingTurn>,
    inflight: Option<ReplyFuture>,
    ids: IdGenerator,
    input: String,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl ConversationController {
    /// Create a controller seeded with the persisted history.
    ///
    /// From here on every store mutation is written back through `persistence`.
    pub fn new(config: ControllerConfig, relay: Arc<dyn Relay>, persistence: Persistence) -> Self {
        let (event_tx, _) = broadcast::channel(1024);

        let history = persistence.load();
        let ids = IdGenerator::after(history.last().map(|m| m.id));

        let mut store = MessageStore::from_messages(history);
        store.subscribe(Box::new(persistence));
        store.subscribe(Box::new(EventPublisher::new(event_tx.clone())));

        Self {
            config,
            store,
            relay,
            reveal: RevealScheduler::new(),
            reveal_handle: None,
            state: TurnState::Idle,
            pending: None,
            inflight: None,
            ids,
            input: String::new(),
            event_tx,
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    /// The conversation, oldest first
    pub fn messages(&self) -> &[Message] {
        self.store.snapshot()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingTurn> {
        self.pending.as_ref()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Whether a request or a reveal still needs driving
    pub fn is_busy(&self) -> bool {
        self.inflight.is_some() || self.reveal.is_active()
    }

    /// The input buffer
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Mutable access to the input buffer
    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    /// Submit the input buffer. The buffer is cleared only if a turn started.
    pub fn submit_input(&mut self) -> SubmitOutcome {
        let text = std::mem::take(&mut self.input);
        let outcome = self.submit(&text);
        if !matches!(outcome, SubmitOutcome::Sent { .. }) {
            self.input = text;
        }
        outcome
    }

    /// Start a turn with `text`.
    ///
    /// Ignored while a reply is awaited. A reveal still running is cancelled
    /// first; its message keeps the prefix revealed so far.
    pub fn submit(&mut self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Empty;
        }
        if self.state == TurnState::AwaitingReply {
            tracing::debug!("Ignoring submit while awaiting a reply");
            return SubmitOutcome::Busy;
        }

        self.cancel_reveal();
        if let Some(previous) = self.pending.take() {
            // The interrupted reply keeps its revealed prefix
            self.end_turn(previous, TurnStatus::Done);
        }

        let user_id = self.ids.next_id();
        let assistant_id = self.ids.next_id();
        if let Err(e) = self.store.append(Message::user(user_id, text)) {
            self.contract_violation(e);
            return SubmitOutcome::Empty;
        }

        self.pending = Some(PendingTurn {
            user_text: text.to_string(),
            assistant_id,
            status: TurnStatus::Awaiting,
        });

        let relay = Arc::clone(&self.relay);
        let text = text.to_string();
        self.inflight = Some(Box::pin(async move { relay.send(&text).await }));
        self.set_state(TurnState::AwaitingReply);

        SubmitOutcome::Sent {
            user_id,
            assistant_id,
        }
    }

    /// Empty the conversation from any state.
    ///
    /// Cancels the active reveal and abandons the in-flight request, so
    /// neither can write into the cleared conversation.
    pub fn clear_conversation(&mut self) {
        self.cancel_reveal();
        if self.inflight.take().is_some() {
            tracing::debug!("Abandoning in-flight request");
        }
        self.pending = None;
        self.store.clear();
        self.set_state(TurnState::Idle);
    }

    /// Drive the in-flight request or the active reveal by one event.
    ///
    /// Returns `false` immediately when there is nothing to drive.
    pub async fn step(&mut self) -> bool {
        if !self.is_busy() {
            return false;
        }

        tokio::select! {
            result = wait_reply(&mut self.inflight), if self.inflight.is_some() => {
                self.inflight = None;
                self.on_reply(result);
            }
            _ = self.reveal.tick(), if self.reveal.is_active() => {
                self.on_reveal_tick();
            }
        }
        true
    }

    /// Drive until the current turn has settled
    pub async fn settle(&mut self) {
        while self.step().await {}
    }

    fn on_reply(&mut self, result: quill_relay::Result<String>) {
        let Some(mut turn) = self.pending.take() else {
            tracing::debug!("Dropping reply for a turn that no longer exists");
            return;
        };

        match result {
            Ok(reply) => {
                if let Err(e) = self.store.append(Message::placeholder(turn.assistant_id)) {
                    self.contract_violation(e);
                    return;
                }

                let started = self.reveal.start(
                    &mut self.store,
                    turn.assistant_id,
                    &reply,
                    self.config.reveal,
                );
                match started {
                    Ok(handle) if handle.is_completed() => {
                        self.end_turn(turn, TurnStatus::Done);
                        self.set_state(TurnState::Idle);
                    }
                    Ok(handle) => {
                        self.reveal_handle = Some(handle);
                        turn.status = TurnStatus::Revealing;
                        self.pending = Some(turn);
                        self.set_state(TurnState::Revealing);
                    }
                    Err(e) => self.contract_violation(e),
                }
            }
            Err(e) => {
                tracing::warn!("Relay request failed: {}", e);
                self.set_state(TurnState::Failed);

                let message = Message::assistant(turn.assistant_id, self.config.error_text.clone());
                if let Err(err) = self.store.append(message) {
                    self.contract_violation(err);
                    return;
                }
                let _ = self.event_tx.send(ChatEvent::TurnFailed {
                    error: e.to_string(),
                });
                self.end_turn(turn, TurnStatus::Failed);
                self.set_state(TurnState::Idle);
            }
        }
    }

    fn on_reveal_tick(&mut self) {
        match self.reveal.advance(&mut self.store) {
            Ok(Some(step)) if step.is_final() => self.finish_reveal(),
            Ok(Some(_)) => {}
            Ok(None) => {
                if !self.reveal.is_active() {
                    self.finish_reveal();
                }
            }
            Err(e) => self.contract_violation(e),
        }
    }

    fn finish_reveal(&mut self) {
        self.reveal_handle = None;
        if let Some(turn) = self.pending.take() {
            self.end_turn(turn, TurnStatus::Done);
        }
        self.set_state(TurnState::Idle);
    }

    fn end_turn(&self, turn: PendingTurn, status: TurnStatus) {
        tracing::debug!(
            "Turn for message {} finished: {:?}",
            turn.assistant_id,
            status
        );
        let _ = self.event_tx.send(ChatEvent::TurnFinished {
            assistant_id: turn.assistant_id,
            status,
        });
    }

    fn cancel_reveal(&mut self) {
        if let Some(handle) = self.reveal_handle.take() {
            tracing::debug!("Cancelling reveal of message {}", handle.target());
            self.reveal.cancel(&mut self.store, &handle);
        }
    }

    /// Store contract violations are bugs: loud in debug builds, recovered otherwise
    fn contract_violation(&mut self, error: StoreError) {
        tracing::error!("Message store contract violated: {}", error);
        if cfg!(debug_assertions) {
            panic!("message store contract violated: {}", error);
        }

        self.cancel_reveal();
        self.inflight = None;
        self.pending = None;
        self.set_state(TurnState::Idle);
    }

    fn set_state(&mut self, state: TurnState) {
        if self.state == state {
            return;
        }
        tracing::debug!("Turn state {:?} -> {:?}", self.state, state);
        self.state = state;
        let _ = self.event_tx.send(ChatEvent::StateChanged { state });
    }
}

async fn wait_reply(inflight: &mut Option<ReplyFuture>) -> quill_relay::Result<String> {
    match inflight {
        Some(reply) => reply.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::persistence::{HISTORY_KEY, MemorySlot};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// A relay that answers from a script after a fixed latency.
    struct MockRelay {
        replies: Mutex<Vec<quill_relay::Result<String>>>,
        sent: Mutex<Vec<String>>,
        latency: Duration,
    }

    impl MockRelay {
        fn new(replies: Vec<quill_relay::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                sent: Mutex::new(Vec::new()),
                latency: Duration::from_millis(100),
            })
        }
    }

    #[async_trait]
    impl Relay for MockRelay {
        async fn send(&self, text: &str) -> quill_relay::Result<String> {
            self.sent.lock().push(text.to_string());
            tokio::time::sleep(self.latency).await;
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                Ok("done".to_string())
            } else {
                replies.remove(0)
            }
        }
    }

    fn relay_error() -> quill_relay::Error {
        quill_relay::Error::status(500, r#"{"error":"upstream failed"}"#)
    }

    fn controller(
        relay: Arc<MockRelay>,
        slot: MemorySlot,
        chunk_size: usize,
    ) -> ConversationController {
        let config = ControllerConfig {
            reveal: RevealConfig {
                chunk_size,
                delay: Duration::from_millis(25),
            },
            error_text: "connection failed".to_string(),
        };
        ConversationController::new(config, relay, Persistence::new(slot))
    }

    fn drain(rx: &mut broadcast::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn persisted(slot: &MemorySlot) -> Vec<(String, String)> {
        let raw = slot.get(HISTORY_KEY).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|m| {
                (
                    m["role"].as_str().unwrap().to_string(),
                    m["content"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(r, c)| (r.to_string(), c.to_string()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_appends_user_message_before_reply() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![Ok("hello there".into())]);
        let mut ctl = controller(relay.clone(), slot.clone(), 5);

        let outcome = ctl.submit("hi");
        assert!(matches!(outcome, SubmitOutcome::Sent { .. }));
        assert_eq!(ctl.state(), TurnState::AwaitingReply);
        assert_eq!(ctl.messages().len(), 1);
        assert_eq!(ctl.messages()[0].role, Role::User);
        assert_eq!(ctl.messages()[0].content, "hi");
        assert_eq!(persisted(&slot), pairs(&[("user", "hi")]));

        let pending = ctl.pending().unwrap();
        assert_eq!(pending.user_text, "hi");
        assert_eq!(pending.status, TurnStatus::Awaiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_turn_reveals_and_persists() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![Ok("hello there".into())]);
        let mut ctl = controller(relay.clone(), slot.clone(), 5);
        let mut rx = ctl.subscribe();

        let SubmitOutcome::Sent { assistant_id, .. } = ctl.submit("hi") else {
            panic!("turn did not start");
        };
        ctl.settle().await;

        let events = drain(&mut rx);
        let contents: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ContentUpdated { id, content } if *id == assistant_id => {
                    Some(content.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["hello", "hello ther", "hello there"]);
        assert!(events.contains(&ChatEvent::TurnFinished {
            assistant_id,
            status: TurnStatus::Done
        }));

        assert_eq!(ctl.state(), TurnState::Idle);
        assert!(ctl.pending().is_none());
        assert!(!ctl.is_busy());
        assert_eq!(*relay.sent.lock(), vec!["hi".to_string()]);
        assert!(ctl.messages().iter().all(|m| !m.revealing));
        assert_eq!(
            persisted(&slot),
            pairs(&[("user", "hi"), ("assistant", "hello there")])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_word_reply_in_two_steps() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![Ok("hello there".into())]);
        let mut ctl = controller(relay, slot, 6);
        let mut rx = ctl.subscribe();

        ctl.submit("hi");
        ctl.settle().await;

        let contents: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::ContentUpdated { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["hello ", "hello there"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_mutation_is_saved() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![Ok("abcdefg".into())]);
        let mut ctl = controller(relay, slot.clone(), 2);

        ctl.submit("hi");
        ctl.settle().await;

        // user append + placeholder append + ceil(7 / 2) reveal steps
        assert_eq!(slot.write_count(), 1 + 1 + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_turn_writes_error_message() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![Err(relay_error())]);
        let mut ctl = controller(relay, slot.clone(), 5);
        let mut rx = ctl.subscribe();

        ctl.submit("hi");
        ctl.settle().await;

        let events = drain(&mut rx);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, ChatEvent::ContentUpdated { .. }))
        );
        assert!(!events.iter().any(|e| matches!(
            e,
            ChatEvent::RevealStateChanged {
                revealing: true,
                ..
            }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ChatEvent::TurnFailed { error } if error.contains("upstream failed")
        )));
        assert!(events.contains(&ChatEvent::StateChanged {
            state: TurnState::Failed
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            ChatEvent::TurnFinished {
                status: TurnStatus::Failed,
                ..
            }
        )));

        assert_eq!(ctl.state(), TurnState::Idle);
        assert_eq!(ctl.messages().len(), 2);
        assert_eq!(ctl.messages()[1].role, Role::Assistant);
        assert_eq!(ctl.messages()[1].content, "connection failed");
        assert!(!ctl.messages()[1].revealing);
        assert_eq!(
            persisted(&slot),
            pairs(&[("user", "hi"), ("assistant", "connection failed")])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_submit_is_noop() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![]);
        let mut ctl = controller(relay.clone(), slot.clone(), 5);

        assert_eq!(ctl.submit(""), SubmitOutcome::Empty);
        assert_eq!(ctl.submit("  \n\t "), SubmitOutcome::Empty);
        assert!(ctl.messages().is_empty());
        assert_eq!(ctl.state(), TurnState::Idle);
        assert!(!ctl.step().await);
        assert_eq!(slot.write_count(), 0);
        assert!(relay.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_while_awaiting_is_ignored() {
        let relay = MockRelay::new(vec![Ok("first".into())]);
        let mut ctl = controller(relay.clone(), MemorySlot::new(), 5);

        ctl.submit("one");
        assert_eq!(ctl.submit("two"), SubmitOutcome::Busy);
        assert_eq!(ctl.messages().len(), 1);

        ctl.settle().await;
        assert_eq!(*relay.sent.lock(), vec!["one".to_string()]);
        assert_eq!(ctl.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_buffer_cleared_only_when_sent() {
        let relay = MockRelay::new(vec![]);
        let mut ctl = controller(relay, MemorySlot::new(), 5);

        ctl.input_mut().push_str("   ");
        assert_eq!(ctl.submit_input(), SubmitOutcome::Empty);
        assert_eq!(ctl.input(), "   ");

        ctl.input_mut().clear();
        ctl.input_mut().push_str("hello");
        assert!(matches!(ctl.submit_input(), SubmitOutcome::Sent { .. }));
        assert_eq!(ctl.input(), "");

        ctl.input_mut().push_str("again");
        assert_eq!(ctl.submit_input(), SubmitOutcome::Busy);
        assert_eq!(ctl.input(), "again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_reveal_cancels_and_empties_slot() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![Ok("a long reply".into())]);
        let mut ctl = controller(relay, slot.clone(), 1);

        ctl.submit("hi");
        assert!(ctl.step().await); // reply arrives
        assert_eq!(ctl.state(), TurnState::Revealing);
        assert!(ctl.step().await); // first character
        assert_eq!(ctl.messages()[1].content, "a");

        ctl.clear_conversation();
        assert_eq!(ctl.state(), TurnState::Idle);
        assert!(ctl.messages().is_empty());
        assert_eq!(slot.get(HISTORY_KEY).as_deref(), Some("[]"));

        let writes = slot.write_count();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!ctl.step().await);
        assert!(ctl.messages().is_empty());
        assert_eq!(slot.write_count(), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_while_awaiting_drops_reply() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![Ok("late".into())]);
        let mut ctl = controller(relay, slot.clone(), 1);

        ctl.submit("hi");
        ctl.clear_conversation();

        assert!(ctl.pending().is_none());
        assert!(!ctl.is_busy());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!ctl.step().await);
        assert!(ctl.messages().is_empty());
        assert_eq!(slot.get(HISTORY_KEY).as_deref(), Some("[]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_during_reveal_cancels_previous() {
        let slot = MemorySlot::new();
        let relay = MockRelay::new(vec![Ok("first reply".into()), Ok("second".into())]);
        let mut ctl = controller(relay, slot.clone(), 1);

        ctl.submit("one");
        ctl.step().await; // reply
        ctl.step().await; // "f"
        ctl.step().await; // "fi"
        assert_eq!(ctl.state(), TurnState::Revealing);

        let first_id = ctl.pending().unwrap().assistant_id;
        let mut rx = ctl.subscribe();
        let SubmitOutcome::Sent { assistant_id, .. } = ctl.submit("two") else {
            panic!("turn did not start");
        };
        assert_eq!(ctl.state(), TurnState::AwaitingReply);
        assert!(ctl.messages().iter().all(|m| !m.revealing));
        assert!(drain(&mut rx).contains(&ChatEvent::TurnFinished {
            assistant_id: first_id,
            status: TurnStatus::Done,
        }));

        ctl.settle().await;
        assert!(drain(&mut rx).contains(&ChatEvent::TurnFinished {
            assistant_id,
            status: TurnStatus::Done,
        }));
        assert_eq!(
            persisted(&slot),
            pairs(&[
                ("user", "one"),
                ("assistant", "fi"),
                ("user", "two"),
                ("assistant", "second"),
            ])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_reply_finishes_immediately() {
        let relay = MockRelay::new(vec![Ok(String::new())]);
        let mut ctl = controller(relay, MemorySlot::new(), 1);

        ctl.submit("hi");
        assert!(ctl.step().await);
        assert_eq!(ctl.state(), TurnState::Idle);
        assert!(!ctl.is_busy());
        assert_eq!(ctl.messages()[1].content, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_seeds_store_and_ids_continue() {
        let slot = MemorySlot::with_value(
            HISTORY_KEY,
            r#"[{"id":10,"role":"user","content":"old"},{"id":11,"role":"assistant","content":"reply"}]"#,
        );
        let relay = MockRelay::new(vec![]);
        let mut ctl = controller(relay, slot.clone(), 5);

        assert_eq!(ctl.messages().len(), 2);
        assert_eq!(slot.write_count(), 0);

        let SubmitOutcome::Sent {
            user_id,
            assistant_id,
        } = ctl.submit("new")
        else {
            panic!("turn did not start");
        };
        assert!(user_id > MessageId(11));
        assert!(assistant_id > user_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_with_exhausted_ids_starts_empty() {
        let slot = MemorySlot::with_value(
            HISTORY_KEY,
            r#"[{"id":18446744073709551615,"role":"user","content":"old"}]"#,
        );
        let relay = MockRelay::new(vec![Ok("fresh".into())]);
        let mut ctl = controller(relay, slot.clone(), 5);
        assert!(ctl.messages().is_empty());

        assert!(matches!(ctl.submit("new"), SubmitOutcome::Sent { .. }));
        ctl.settle().await;
        assert_eq!(
            persisted(&slot),
            pairs(&[("user", "new"), ("assistant", "fresh")])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_history_starts_empty() {
        let slot = MemorySlot::with_value(HISTORY_KEY, "{broken");
        let ctl = controller(MockRelay::new(vec![]), slot, 5);
        assert!(ctl.messages().is_empty());
        assert_eq!(ctl.state(), TurnState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_events_follow_turn() {
        let relay = MockRelay::new(vec![Ok("ok".into())]);
        let mut ctl = controller(relay, MemorySlot::new(), 1);
        let mut rx = ctl.subscribe();

        ctl.submit("hi");
        ctl.settle().await;

        let states: Vec<TurnState> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::StateChanged { state } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                TurnState::AwaitingReply,
                TurnState::Revealing,
                TurnState::Idle
            ]
        );
    }
}
