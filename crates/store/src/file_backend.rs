//! File-based store — one JSON-lines file per session.
//!
//! Each line is a JSON-encoded `Message`. A snapshot replaces the whole file
//! (written to a temporary sibling, then renamed) so a crash mid-write never
//! leaves a half-written log behind.
//!
//! Storage location: `~/.sagechat/sessions/<session>.jsonl`, where bytes of
//! the session key outside `[A-Za-z0-9_-]` are written as `%XX`. Distinct
//! keys therefore never share a file.

use std::path::PathBuf;

use async_trait::async_trait;
use sagechat_core::error::StoreError;
use sagechat_core::message::Message;
use sagechat_core::store::LogStore;
use tracing::{debug, warn};

/// A file-backed snapshot store using JSONL (one message per line).
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store writing under `dir` (created on first save).
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Path of the snapshot file for a session key.
    pub fn session_path(&self, session: &str) -> PathBuf {
        let mut file = String::with_capacity(session.len());
        for byte in session.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                file.push(char::from(byte));
            } else {
                file.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{file}.jsonl"))
    }

    /// Parse a snapshot, skipping unreadable lines.
    ///
    /// A file with content but no readable line at all is reported as
    /// corrupted rather than silently loading as an empty conversation.
    fn parse(session: &str, content: &str) -> Result<Vec<Message>, StoreError> {
        let mut messages = Vec::new();
        let mut skipped = 0usize;
        let mut last_error = None;
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<Message>(line) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(session, error = %e, "Skipping corrupted message line");
                    skipped += 1;
                    last_error = Some(e);
                }
            }
        }

        if messages.is_empty() {
            if let Some(e) = last_error {
                return Err(StoreError::Corrupted {
                    session: session.to_string(),
                    reason: format!("none of {skipped} lines could be read: {e}"),
                });
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl LogStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, session: &str) -> Result<Option<Vec<Message>>, StoreError> {
        let path = self.session_path(session);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let messages = Self::parse(session, &content)?;
        debug!(path = %path.display(), count = messages.len(), "Session snapshot loaded");
        Ok(Some(messages))
    }

    async fn save(&self, session: &str, messages: &[Message]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to create session directory: {e}")))?;

        let mut content = String::new();
        for message in messages {
            let line = serde_json::to_string(message)
                .map_err(|e| StoreError::Storage(format!("Failed to serialize message: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        let path = self.session_path(session);
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write snapshot: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace snapshot: {e}")))?;

        Ok(())
    }

    async fn clear(&self, session: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.session_path(session)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Storage(format!("Failed to remove snapshot: {e}"))),
        }
    }
}
