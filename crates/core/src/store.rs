//! LogStore trait — persistence of conversation snapshots.
//!
//! The store sees full snapshots keyed by a session key. It is read once at
//! startup and written after every completed message; it never mutates the
//! live log.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::Message;

/// The core LogStore trait.
///
/// Implementations: JSON file, in-memory (for testing), none (no-op).
#[async_trait]
pub trait LogStore: Send + Sync {
    /// The backend name (e.g., "file", "memory", "none").
    fn name(&self) -> &str;

    /// Load the snapshot saved under `session`, if any.
    async fn load(&self, session: &str) -> std::result::Result<Option<Vec<Message>>, StoreError>;

    /// Replace the snapshot saved under `session`.
    async fn save(&self, session: &str, messages: &[Message]) -> std::result::Result<(), StoreError>;

    /// Remove the snapshot saved under `session`.
    async fn clear(&self, session: &str) -> std::result::Result<(), StoreError>;
}
