//! Message and ConversationLog domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the user submits a message → the orchestrator opens an assistant message →
//! a stream consumer appends deltas to it → the message is frozen.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Unique, monotonically increasing message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The author of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The primary answer
    Assistant,
    /// The optional critique of the primary answer
    Critic,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Critic => "critic",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,

    /// Who wrote this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// Whether a stream is still appending to this message.
    /// Never persisted: a restored message is always frozen.
    #[serde(skip)]
    open: bool,
}

impl Message {
    fn frozen(id: MessageId, role: Role, content: String) -> Self {
        Self {
            id,
            role,
            content,
            timestamp: Utc::now(),
            open: false,
        }
    }

    /// True while a stream may still append to this message.
    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// Position of an open message in the log, checked against its id on every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    index: usize,
    id: MessageId,
}

impl MessageHandle {
    pub fn id(&self) -> MessageId {
        self.id
    }
}

/// Immutable view of the log handed to observers (renderers, persistence).
pub type LogSnapshot = Arc<[Message]>;

/// Ordered sequence of messages; insertion order is display order.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    messages: Vec<Message>,
    next_id: u64,
}

impl ConversationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuild a log from persisted messages.
    ///
    /// Every restored message is frozen and new ids continue past the highest
    /// restored one.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let next_id = messages.iter().map(|m| m.id.0).max().map_or(1, |max| max + 1);
        let messages = messages
            .into_iter()
            .map(|mut m| {
                m.open = false;
                m
            })
            .collect();
        Self { messages, next_id }
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Append a complete user message.
    pub fn push_user(&mut self, content: impl Into<String>) -> MessageId {
        self.push_frozen(Role::User, content.into())
    }

    /// Append a complete, non-streamed message (error notices, greetings).
    pub fn push_frozen(&mut self, role: Role, content: impl Into<String>) -> MessageId {
        let id = self.allocate_id();
        self.messages.push(Message::frozen(id, role, content.into()));
        id
    }

    /// Append an empty message that a stream will fill.
    pub fn open(&mut self, role: Role) -> MessageHandle {
        let id = self.allocate_id();
        let mut message = Message::frozen(id, role, String::new());
        message.open = true;
        self.messages.push(message);
        MessageHandle {
            index: self.messages.len() - 1,
            id,
        }
    }

    fn resolve(&mut self, handle: MessageHandle) -> Result<&mut Message, LogError> {
        match self.messages.get_mut(handle.index) {
            Some(m) if m.id == handle.id => Ok(m),
            _ => Err(LogError::StaleHandle(handle.id)),
        }
    }

    /// Append a delta to an open message.
    pub fn append(&mut self, handle: MessageHandle, delta: &str) -> Result<(), LogError> {
        let message = self.resolve(handle)?;
        if !message.open {
            return Err(LogError::Frozen(handle.id));
        }
        message.content.push_str(delta);
        Ok(())
    }

    /// Close a message for further appends. Freezing twice is a no-op.
    pub fn freeze(&mut self, handle: MessageHandle) -> Result<&Message, LogError> {
        let message = self.resolve(handle)?;
        message.open = false;
        Ok(message)
    }

    /// Remove an open message that never received content worth keeping.
    ///
    /// Only the newest message can be discarded, so no other handle shifts.
    pub fn discard(&mut self, handle: MessageHandle) -> Result<Message, LogError> {
        let message = self.resolve(handle)?;
        if !message.open {
            return Err(LogError::Frozen(handle.id));
        }
        if handle.index + 1 != self.messages.len() {
            return Err(LogError::NotNewest(handle.id));
        }
        self.messages.pop().ok_or(LogError::StaleHandle(handle.id))
    }

    /// Freeze every message still open, returning how many were.
    pub fn freeze_all(&mut self) -> usize {
        let mut frozen = 0;
        for message in self.messages.iter_mut().filter(|m| m.open) {
            message.open = false;
            frozen += 1;
        }
        frozen
    }

    /// Look up the message behind a handle.
    pub fn get(&self, handle: MessageHandle) -> Option<&Message> {
        self.messages.get(handle.index).filter(|m| m.id == handle.id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages currently open for append.
    pub fn open_count(&self) -> usize {
        self.messages.iter().filter(|m| m.open).count()
    }

    /// Copy the current state into an immutable snapshot.
    pub fn snapshot(&self) -> LogSnapshot {
        Arc::from(self.messages.as_slice())
    }

    /// Drop every message. Ids keep increasing.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}
