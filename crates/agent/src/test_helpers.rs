//! Shared test doubles for orchestration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use sagechat_core::error::StoreError;
use sagechat_core::message::Message;
use sagechat_core::store::LogStore;
use tokio::sync::Notify;

use async_trait::async_trait;
use sagechat_core::error::{ProviderError, RetrievalError};
use sagechat_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use sagechat_core::retrieval::{SearchProvider, SearchResult};
use tokio::sync::mpsc;

/// One scripted answer to a `stream` call.
pub enum Script {
    /// Stream these deltas, then the done chunk.
    Deltas(Vec<String>),
    /// Reject the request before streaming.
    Reject(ProviderError),
    /// Stream these deltas, then fail mid-stream.
    FailAfter(Vec<String>, ProviderError),
    /// Hand out a receiver the test feeds by hand.
    Channel(ChunkReceiver),
    /// Never answer the request.
    Stall,
}

impl Script {
    pub fn deltas(parts: &[&str]) -> Self {
        Self::Deltas(parts.iter().map(|p| p.to_string()).collect())
    }
}

/// A provider that answers each call with the next script in the queue.
///
/// Returns `NotConfigured` once the queue is exhausted.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose single stream is driven through the returned sender.
    pub fn controlled() -> (Self, mpsc::Sender<Result<StreamChunk, ProviderError>>) {
        let (tx, rx) = mpsc::channel(32);
        (Self::new(vec![Script::Channel(rx)]), tx)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();

        let (deltas, failure) = match script {
            None => return Err(ProviderError::NotConfigured("no scripted response left".into())),
            Some(Script::Reject(e)) => return Err(e),
            Some(Script::Channel(rx)) => return Ok(rx),
            Some(Script::Stall) => std::future::pending().await,
            Some(Script::Deltas(deltas)) => (deltas, None),
            Some(Script::FailAfter(deltas, e)) => (deltas, Some(e)),
        };

        let (tx, rx) = mpsc::channel(deltas.len() + 1);
        for delta in deltas {
            let _ = tx.try_send(Ok(StreamChunk::delta(delta)));
        }
        let _ = match failure {
            Some(e) => tx.try_send(Err(e)),
            None => tx.try_send(Ok(StreamChunk::finished())),
        };
        Ok(rx)
    }
}

/// Search backend returning a fixed result list.
pub struct StaticSearch {
    results: Vec<SearchResult>,
}

impl StaticSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results }
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, RetrievalError> {
        Ok(self.results.clone())
    }
}

/// Search backend that always fails.
pub struct FailingSearch;

#[async_trait]
impl SearchProvider for FailingSearch {
    fn name(&self) -> &str {
        "failing"
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, RetrievalError> {
        Err(RetrievalError::Status {
            status_code: 500,
            message: "搜索失败".into(),
        })
    }
}

/// Search backend that never answers.
pub struct StalledSearch;

#[async_trait]
impl SearchProvider for StalledSearch {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, RetrievalError> {
        std::future::pending().await
    }
}

/// A store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl LogStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn load(&self, _session: &str) -> Result<Option<Vec<Message>>, StoreError> {
        Err(StoreError::Storage("disk unavailable".into()))
    }

    async fn save(&self, _session: &str, _messages: &[Message]) -> Result<(), StoreError> {
        Err(StoreError::Storage("disk unavailable".into()))
    }

    async fn clear(&self, _session: &str) -> Result<(), StoreError> {
        Err(StoreError::Storage("disk unavailable".into()))
    }
}

/// A store whose `clear` waits until the test releases it.
#[derive(Default)]
pub struct GatedStore {
    pub clear_started: Notify,
    pub release: Notify,
}

#[async_trait]
impl LogStore for GatedStore {
    fn name(&self) -> &str {
        "gated"
    }

    async fn load(&self, _session: &str) -> Result<Option<Vec<Message>>, StoreError> {
        Ok(None)
    }

    async fn save(&self, _session: &str, _messages: &[Message]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn clear(&self, _session: &str) -> Result<(), StoreError> {
        self.clear_started.notify_one();
        self.release.notified().await;
        Ok(())
    }
}
