//! Generation and retrieval backends for SageChat.
//!
//! The generation provider implements `sagechat_core::Provider` over any
//! OpenAI-compatible endpoint; the search provider implements
//! `sagechat_core::SearchProvider` over a JSON search endpoint.

pub mod builder;
pub mod openai_compat;
pub mod search;
pub mod sse;

pub use builder::{build_provider, build_search};
pub use openai_compat::OpenAiCompatProvider;
pub use search::HttpSearchProvider;
pub use sse::{ChunkDecoder, SseEvent};
