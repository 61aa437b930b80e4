//! # SageChat Core
//!
//! Domain types, traits, and error definitions for the SageChat conversation
//! client. This crate has no HTTP or storage dependencies; it defines the
//! domain model that the provider, store, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (generation, retrieval, persistence) is a trait
//! here. Implementations live in their respective crates, which keeps the
//! orchestrator testable against scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::Error;
pub use message::{ConversationLog, LogSnapshot, Message, MessageHandle, MessageId, Role};
pub use provider::{ChunkReceiver, PromptMessage, PromptRole, Provider, ProviderRequest, StreamChunk};
pub use retrieval::{SearchProvider, SearchResult, MAX_SEARCH_RESULTS};
pub use store::LogStore;
