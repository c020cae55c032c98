//! Typewriter reveal of a fully-known reply
//!
//! The scheduler is a cooperative step function: [`RevealScheduler::tick`]
//! waits until the next step is due and [`RevealScheduler::advance`] writes
//! the next prefix into the store. The owner decides when to call either, so
//! a reveal never runs behind the owner's back and stops the moment its
//! handle is cancelled.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    error::StoreError,
    message::MessageId,
    store::MessageStore,
};

/// Reveal pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealConfig {
    /// Characters exposed per step
    pub chunk_size: usize,
    /// Time between steps
    pub delay: Duration,
}

impl Default for RevealConfig {
    /// One character every 25ms
    fn default() -> Self {
        Self {
            chunk_size: 1,
            delay: Duration::from_millis(25),
        }
    }
}

impl RevealConfig {
    /// 24 characters every 28ms, for long replies
    pub fn batched() -> Self {
        Self {
            chunk_size: 24,
            delay: Duration::from_millis(28),
        }
    }

    /// Number of steps needed to reveal `chars` characters
    pub fn steps_for(&self, chars: usize) -> usize {
        chars.div_ceil(self.chunk_size.max(1))
    }
}

/// Handle to one reveal. Clones refer to the same reveal.
#[derive(Debug, Clone)]
pub struct RevealHandle {
    id: u64,
    target: MessageId,
    cancel: CancellationToken,
    completed: Arc<AtomicBool>,
}

impl RevealHandle {
    fn new(id: u64, target: MessageId) -> Self {
        Self {
            id,
            target,
            cancel: CancellationToken::new(),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Message being revealed
    pub fn target(&self) -> MessageId {
        self.target
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the full text has been exposed
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Still emitting steps
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_completed()
    }

    fn complete(&self) {
        self.completed.store(true, Ordering::Release);
    }
}

/// Result of one reveal step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealStep {
    pub target: MessageId,
    /// Characters exposed after this step
    pub revealed: usize,
    /// Characters in the full text
    pub total: usize,
}

impl RevealStep {
    pub fn is_final(&self) -> bool {
        self.revealed == self.total
    }
}

struct ActiveReveal {
    handle: RevealHandle,
    chars: Vec<char>,
    revealed: usize,
    chunk_size: usize,
    interval: Interval,
}

/// Runs at most one reveal at a time
#[derive(Default)]
pub struct RevealScheduler {
    active: Option<ActiveReveal>,
    next_handle_id: u64,
}

impl RevealScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin revealing `full_text` into `target`.
    ///
    /// Any reveal still running is cancelled first. An empty text completes
    /// immediately without a single step. Must be called inside a tokio
    /// runtime.
    pub fn start(
        &mut self,
        store: &mut MessageStore,
        target: MessageId,
        full_text: &str,
        config: RevealConfig,
    ) -> Result<RevealHandle, StoreError> {
        if let Some(previous) = self.handle().cloned() {
            self.cancel(store, &previous);
        }

        self.next_handle_id += 1;
        let handle = RevealHandle::new(self.next_handle_id, target);
        let chars: Vec<char> = full_text.chars().collect();

        if chars.is_empty() {
            store.get(target).ok_or(StoreError::NotFound(target))?;
            handle.complete();
            return Ok(handle);
        }

        store.set_revealing(target, true)?;

        let mut interval = tokio::time::interval_at(Instant::now() + config.delay, config.delay);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            "Revealing {} chars into message {} ({} per {:?})",
            chars.len(),
            target,
            config.chunk_size,
            config.delay
        );

        self.active = Some(ActiveReveal {
            handle: handle.clone(),
            chars,
            revealed: 0,
            chunk_size: config.chunk_size.max(1),
            interval,
        });
        Ok(handle)
    }

    /// Stop the reveal behind `handle`.
    ///
    /// The target keeps whatever prefix was already exposed. Cancelling a
    /// finished or unknown handle is a no-op apart from marking it cancelled.
    pub fn cancel(&mut self, store: &mut MessageStore, handle: &RevealHandle) {
        handle.cancel.cancel();
        let is_current = self
            .active
            .as_ref()
            .is_some_and(|active| active.handle.id == handle.id);
        if is_current {
            self.active = None;
            self.release(store, handle.target);
        }
    }

    /// Handle of the running reveal
    pub fn handle(&self) -> Option<&RevealHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Wait until the next step is due. Never resolves while idle.
    ///
    /// Cancel-safe: dropping the future loses no step.
    pub async fn tick(&mut self) {
        match self.active.as_mut() {
            Some(active) => {
                active.interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Expose the next chunk.
    ///
    /// Returns `None` when there is nothing to do (idle, or the handle was
    /// cancelled from elsewhere, in which case the reveal is wound down).
    pub fn advance(&mut self, store: &mut MessageStore) -> Result<Option<RevealStep>, StoreError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };

        let target = active.handle.target;
        if active.handle.is_cancelled() {
            self.active = None;
            self.release(store, target);
            return Ok(None);
        }

        let current = match store.get(target) {
            Some(message) => &message.content,
            None => {
                self.active = None;
                return Err(StoreError::NotFound(target));
            }
        };

        let end = (active.revealed + active.chunk_size).min(active.chars.len());
        let mut next: String = active.chars[..active.revealed].iter().collect();
        if *current != next {
            tracing::warn!(
                "Message {} changed under an active reveal, restoring revealed prefix",
                target
            );
        }
        next.extend(&active.chars[active.revealed..end]);

        store.update_content(target, next)?;
        active.revealed = end;

        let step = RevealStep {
            target,
            revealed: end,
            total: active.chars.len(),
        };

        if step.is_final() {
            let handle = active.handle.clone();
            self.active = None;
            store.set_revealing(target, false)?;
            handle.complete();
            tracing::debug!("Reveal of message {} complete", target);
        }

        Ok(Some(step))
    }

    /// Wait for and perform the next step
    pub async fn step(
        &mut self,
        store: &mut MessageStore,
    ) -> Result<Option<RevealStep>, StoreError> {
        if !self.is_active() {
            return Ok(None);
        }
        self.tick().await;
        self.advance(store)
    }

    /// Clear the reveal flag; the target may already be gone after a clear
    fn release(&self, store: &mut MessageStore, target: MessageId) {
        match store.set_revealing(target, false) {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => tracing::warn!("Failed to release message {}: {}", target, e),
        }
    }
}
