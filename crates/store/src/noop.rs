//! No-op store — disables conversation persistence entirely.

use async_trait::async_trait;
use sagechat_core::error::StoreError;
use sagechat_core::message::Message;
use sagechat_core::store::LogStore;

/// A store that keeps nothing.
pub struct NoopStore;

#[async_trait]
impl LogStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn load(&self, _session: &str) -> Result<Option<Vec<Message>>, StoreError> {
        Ok(None)
    }

    async fn save(&self, _session: &str, _messages: &[Message]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn clear(&self, _session: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
