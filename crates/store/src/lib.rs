//! Conversation snapshot stores for SageChat.

pub mod file_backend;
pub mod in_memory;
pub mod noop;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use noop::NoopStore;
