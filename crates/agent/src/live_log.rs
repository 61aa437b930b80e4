//! Shared conversation log with snapshot broadcast.
//!
//! Writers take a short `std::sync::Mutex` lock per mutation (never across an
//! `.await`); every mutation publishes a fresh immutable snapshot on a
//! `watch` channel, so renderers never block a stream.
//!
//! Publishing copies the whole log, so the cost of one delta grows with the
//! length of the conversation. Sessions here are interactive and short, and a
//! renderer needs the open message's text in every snapshot anyway. For very
//! long restored sessions, `content(handle)` reads one message without a
//! snapshot.

use std::sync::{Mutex, MutexGuard, PoisonError};

use sagechat_core::error::LogError;
use sagechat_core::message::{ConversationLog, LogSnapshot, Message, MessageHandle, MessageId, Role};
use tokio::sync::watch;

pub struct LiveLog {
    log: Mutex<ConversationLog>,
    snapshots: watch::Sender<LogSnapshot>,
}

impl LiveLog {
    pub fn new(log: ConversationLog) -> Self {
        let (snapshots, _) = watch::channel(log.snapshot());
        Self {
            log: Mutex::new(log),
            snapshots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConversationLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a mutation and publish the resulting snapshot.
    fn mutate<T>(&self, f: impl FnOnce(&mut ConversationLog) -> T) -> T {
        let mut log = self.lock();
        let out = f(&mut log);
        self.snapshots.send_replace(log.snapshot());
        out
    }

    /// Observe the log. The receiver always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<LogSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> LogSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn push_user(&self, content: &str) -> MessageId {
        self.mutate(|log| log.push_user(content))
    }

    pub fn push_frozen(&self, role: Role, content: &str) -> MessageId {
        self.mutate(|log| log.push_frozen(role, content))
    }

    pub fn open(&self, role: Role) -> MessageHandle {
        self.mutate(|log| log.open(role))
    }

    pub fn append(&self, handle: MessageHandle, delta: &str) -> Result<(), LogError> {
        self.mutate(|log| log.append(handle, delta))
    }

    pub fn freeze(&self, handle: MessageHandle) -> Result<Message, LogError> {
        self.mutate(|log| log.freeze(handle).cloned())
    }

    pub fn discard(&self, handle: MessageHandle) -> Result<Message, LogError> {
        self.mutate(|log| log.discard(handle))
    }

    /// Current content of the message behind `handle`.
    pub fn content(&self, handle: MessageHandle) -> Option<String> {
        self.lock().get(handle).map(|m| m.content.clone())
    }

    /// Freeze every message still open. Used when a turn unwinds early.
    pub fn freeze_all(&self) -> usize {
        self.mutate(|log| log.freeze_all())
    }

    pub fn clear(&self) {
        self.mutate(|log| log.clear());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
