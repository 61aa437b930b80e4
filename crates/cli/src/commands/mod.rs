pub mod chat;
pub mod doctor;
pub mod history;
pub mod onboard;

use std::sync::Arc;

use sagechat_config::{AppConfig, StorageConfig};
use sagechat_core::store::LogStore;
use sagechat_store::{FileStore, InMemoryStore, NoopStore};

/// Build the snapshot store named by `[storage].backend`.
pub fn build_store(storage: &StorageConfig) -> Arc<dyn LogStore> {
    match storage.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "none" => Arc::new(NoopStore),
        _ => Arc::new(FileStore::new(storage.resolved_path())),
    }
}

/// Load config or explain why it could not be loaded.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
