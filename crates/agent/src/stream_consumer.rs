//! Stream consumer — drives one provider call into one log message.
//!
//! ```text
//! pending ──accepted──▶ streaming ──done chunk / end of stream──▶ done
//!    │                      │
//!    │ rejected             ├──transport error──▶ failed
//!    ▼                      └──cancel token─────▶ cancelled
//! failed / cancelled
//! ```
//!
//! The target message is only opened once the provider has accepted the
//! request, so a rejected request leaves the log untouched. Whatever the exit,
//! the target is frozen before `run` returns; a failed session that never
//! received a delta has its empty message removed.

use std::sync::Arc;

use sagechat_core::error::Error;
use sagechat_core::message::{MessageHandle, Role};
use sagechat_core::provider::{Provider, ProviderRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::live_log::LiveLog;

/// Lifecycle of a single streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Streaming,
    Done,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What one stream should produce.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub request: ProviderRequest,
    /// Role of the message the deltas land in.
    pub role: Role,
    /// Text written into the message before the first delta.
    pub preamble: Option<String>,
}

impl StreamSpec {
    pub fn new(request: ProviderRequest, role: Role) -> Self {
        Self {
            request,
            role,
            preamble: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The stream completed; `target` is frozen with the full content.
    Done { target: MessageHandle, deltas: usize },
    /// The stream failed. `target` is the frozen partial message, if any
    /// delta arrived before the failure.
    Failed {
        target: Option<MessageHandle>,
        error: Error,
    },
    /// The cancel token fired. `target` holds whatever arrived before it.
    Cancelled { target: Option<MessageHandle> },
}

impl StreamOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Done { .. } => SessionState::Done,
            Self::Failed { .. } => SessionState::Failed,
            Self::Cancelled { .. } => SessionState::Cancelled,
        }
    }

    /// The message this session left in the log, if any.
    pub fn target(&self) -> Option<MessageHandle> {
        match self {
            Self::Done { target, .. } => Some(*target),
            Self::Failed { target, .. } | Self::Cancelled { target } => *target,
        }
    }
}

/// Runs streaming sessions against one provider.
pub struct StreamConsumer {
    provider: Arc<dyn Provider>,
}

impl StreamConsumer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Stream `spec` into a new message of `log` until completion, failure
    /// or cancellation.
    pub async fn run(
        &self,
        spec: StreamSpec,
        log: &LiveLog,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let StreamSpec {
            mut request,
            role,
            preamble,
        } = spec;
        request.stream = true;

        debug!(
            provider = self.provider.name(),
            model = %request.model,
            role = %role,
            state = SessionState::Pending.as_str(),
            "Opening stream"
        );

        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(role = %role, "Cancelled before the provider answered");
                return StreamOutcome::Cancelled { target: None };
            }
            accepted = self.provider.stream(request) => accepted,
        };

        let mut rx = match accepted {
            Ok(rx) => rx,
            Err(e) => {
                warn!(provider = self.provider.name(), role = %role, error = %e, "Provider rejected request");
                return StreamOutcome::Failed {
                    target: None,
                    error: e.into(),
                };
            }
        };

        let target = log.open(role);
        debug!(role = %role, message = %target.id(), state = SessionState::Streaming.as_str(), "Streaming");

        if let Some(preamble) = preamble {
            if let Err(e) = log.append(target, &preamble) {
                return self.fail(log, target, 0, e.into());
            }
        }

        let mut deltas = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Dropping the receiver aborts the in-flight request.
                    drop(rx);
                    let _ = log.freeze(target);
                    debug!(role = %role, deltas, state = SessionState::Cancelled.as_str(), "Stream cancelled");
                    return StreamOutcome::Cancelled { target: Some(target) };
                }
                next = rx.recv() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Some(delta) = chunk.content.filter(|c| !c.is_empty()) {
                        if let Err(e) = log.append(target, &delta) {
                            return self.fail(log, target, deltas, e.into());
                        }
                        deltas += 1;
                        trace!(role = %role, deltas, "Delta applied");
                    }
                    if chunk.done {
                        break;
                    }
                }
                Some(Err(e)) => return self.fail(log, target, deltas, e.into()),
                // Sender gone without an error: the body simply ended.
                None => break,
            }
        }

        let _ = log.freeze(target);
        debug!(role = %role, deltas, state = SessionState::Done.as_str(), "Stream complete");
        StreamOutcome::Done { target, deltas }
    }

    fn fail(&self, log: &LiveLog, target: MessageHandle, deltas: usize, error: Error) -> StreamOutcome {
        warn!(provider = self.provider.name(), deltas, error = %error, "Stream failed");
        if deltas == 0 && log.discard(target).is_ok() {
            return StreamOutcome::Failed {
                target: None,
                error,
            };
        }
        let _ = log.freeze(target);
        StreamOutcome::Failed {
            target: Some(target),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Script, ScriptedProvider};
    use sagechat_core::error::ProviderError;
    use sagechat_core::message::ConversationLog;
    use sagechat_core::provider::StreamChunk;

    fn spec(role: Role) -> StreamSpec {
        StreamSpec::new(ProviderRequest::streaming("test-model", "hi"), role)
    }

    #[tokio::test]
    async fn deltas_accumulate_in_order() {
        let provider = ScriptedProvider::new(vec![Script::deltas(&["N", "LU是...", "...重要。"])]);
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());

        let outcome = consumer
            .run(spec(Role::Assistant), &log, &CancellationToken::new())
            .await;

        assert_eq!(outcome.state(), SessionState::Done);
        let StreamOutcome::Done { target, deltas } = outcome else {
            unreachable!()
        };
        assert_eq!(deltas, 3);
        assert_eq!(log.content(target).as_deref(), Some("NLU是......重要。"));
        assert!(!log.snapshot()[0].is_open());
    }

    #[tokio::test]
    async fn request_is_marked_streaming() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::deltas(&["x"])]));
        let consumer = StreamConsumer::new(provider.clone());
        let log = LiveLog::new(ConversationLog::new());
        let mut request = ProviderRequest::streaming("m", "hi");
        request.stream = false;

        consumer
            .run(StreamSpec::new(request, Role::Assistant), &log, &CancellationToken::new())
            .await;
        assert!(provider.requests()[0].stream);
    }

    #[tokio::test]
    async fn rejected_request_creates_no_message() {
        let provider = ScriptedProvider::new(vec![Script::Reject(ProviderError::AuthenticationFailed(
            "bad key".into(),
        ))]);
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());

        let outcome = consumer
            .run(spec(Role::Assistant), &log, &CancellationToken::new())
            .await;

        assert_eq!(outcome.state(), SessionState::Failed);
        assert!(outcome.target().is_none());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn failure_before_first_delta_discards_message() {
        let provider = ScriptedProvider::new(vec![Script::FailAfter(
            vec![],
            ProviderError::StreamInterrupted("reset".into()),
        )]);
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());

        let outcome = consumer
            .run(spec(Role::Assistant), &log, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, StreamOutcome::Failed { target: None, .. }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn failure_mid_stream_keeps_partial_content() {
        let provider = ScriptedProvider::new(vec![Script::FailAfter(
            vec!["部分".into()],
            ProviderError::StreamInterrupted("reset".into()),
        )]);
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());

        let outcome = consumer
            .run(spec(Role::Critic), &log, &CancellationToken::new())
            .await;

        let target = outcome.target().unwrap();
        assert_eq!(outcome.state(), SessionState::Failed);
        assert_eq!(log.content(target).as_deref(), Some("部分"));
        assert!(!log.snapshot()[0].is_open());
    }

    #[tokio::test]
    async fn preamble_precedes_deltas() {
        let provider = ScriptedProvider::new(vec![Script::deltas(&["body"])]);
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());

        let outcome = consumer
            .run(
                spec(Role::Critic).with_preamble("opening\n\n"),
                &log,
                &CancellationToken::new(),
            )
            .await;

        let target = outcome.target().unwrap();
        assert_eq!(log.content(target).as_deref(), Some("opening\n\nbody"));
    }

    #[tokio::test]
    async fn cancelled_before_start_creates_no_message() {
        let provider = ScriptedProvider::new(vec![Script::deltas(&["never"])]);
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = consumer.run(spec(Role::Assistant), &log, &cancel).await;
        assert!(matches!(outcome, StreamOutcome::Cancelled { target: None }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn cancel_while_provider_is_connecting() {
        let provider = ScriptedProvider::new(vec![Script::Stall]);
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());
        let cancel = CancellationToken::new();

        let run = consumer.run(spec(Role::Assistant), &log, &cancel);
        let trigger = async {
            tokio::task::yield_now().await;
            cancel.cancel();
        };
        let (outcome, ()) = tokio::join!(run, trigger);

        assert!(matches!(outcome, StreamOutcome::Cancelled { target: None }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn cancellation_freezes_partial_content() {
        let (provider, tx) = ScriptedProvider::controlled();
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());
        let cancel = CancellationToken::new();
        let mut snapshots = log.subscribe();

        let run = consumer.run(spec(Role::Assistant), &log, &cancel);
        let drive = async {
            tx.send(Ok(StreamChunk::delta("N"))).await.unwrap();
            tx.send(Ok(StreamChunk::delta("LU"))).await.unwrap();
            snapshots
                .wait_for(|s| s.first().is_some_and(|m| m.content == "NLU"))
                .await
                .unwrap();
            cancel.cancel();
            // Late delta after cancellation is never applied.
            let _ = tx.send(Ok(StreamChunk::delta("late"))).await;
        };

        let (outcome, ()) = tokio::join!(run, drive);
        let target = outcome.target().unwrap();
        assert_eq!(outcome.state(), SessionState::Cancelled);
        assert_eq!(log.content(target).as_deref(), Some("NLU"));
        assert!(!log.snapshot()[0].is_open());
    }

    #[tokio::test]
    async fn end_of_stream_without_done_chunk_completes() {
        let (provider, tx) = ScriptedProvider::controlled();
        let consumer = StreamConsumer::new(Arc::new(provider));
        let log = LiveLog::new(ConversationLog::new());

        tx.send(Ok(StreamChunk::delta("closed"))).await.unwrap();
        drop(tx);

        let outcome = consumer
            .run(spec(Role::Assistant), &log, &CancellationToken::new())
            .await;
        assert_eq!(outcome.state(), SessionState::Done);
        assert_eq!(log.snapshot()[0].content, "closed");
    }
}
