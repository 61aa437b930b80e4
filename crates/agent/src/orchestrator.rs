//! The turn orchestrator.
//!
//! One turn walks this state machine:
//!
//! ```text
//! Idle ─▶ Augmenting ─▶ PrimaryStreaming ─▶ Gating ─▶ CritiqueStreaming ─▶ Idle
//!   └──(search off)──────────▲                 └──(gate closed)──────────▶ Idle
//! ```
//!
//! A primary failure appends one fixed apology message and ends the turn; a
//! cancellation freezes whatever arrived and ends the turn without any extra
//! message. Critique failures are only logged.
//!
//! Exactly one turn runs at a time. Each turn owns a `CancellationToken`; the
//! critique pass runs under a child of it, so a single `cancel()` stops
//! whichever stage is active.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sagechat_config::AppConfig;
use sagechat_core::error::TurnError;
use sagechat_core::message::{ConversationLog, LogSnapshot, MessageId, Role};
use sagechat_core::provider::{PromptMessage, Provider, ProviderRequest};
use sagechat_core::retrieval::SearchProvider;
use sagechat_core::store::LogStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::augmenter::RetrievalAugmenter;
use crate::critique_gate::{self, CritiqueReason};
use crate::live_log::LiveLog;
use crate::stream_consumer::{SessionState, StreamConsumer, StreamOutcome, StreamSpec};

/// Assistant message appended when the primary stream fails.
pub const APOLOGY_TEXT: &str = "抱歉，发送消息时出现错误。";

const CRITIC_SYSTEM_PROMPT: &str = "你是一位严谨而友善的审阅者。请检查另一位助手对用户问题的回答：\
指出其中的错误、遗漏或含糊之处，补充必要的背景、反例或不同的视角。\
保持简洁，不要重复原回答的内容，使用与原回答相同的语言。";

/// Where the current turn is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Augmenting,
    PrimaryStreaming,
    Gating,
    CritiqueStreaming,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Augmenting => "augmenting",
            Self::PrimaryStreaming => "primary_streaming",
            Self::Gating => "gating",
            Self::CritiqueStreaming => "critique_streaming",
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The primary answer completed (the critique may or may not have run).
    Answered,
    /// The primary stream failed; the apology message was appended.
    Failed,
    /// The turn was cancelled.
    Aborted,
}

/// Summary of one turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub turn: u64,
    pub outcome: TurnOutcome,
    /// The user's message.
    pub question: MessageId,
    /// The primary answer, or the apology on failure.
    pub answer: Option<MessageId>,
    /// The critic message, if one was kept.
    pub critique: Option<MessageId>,
    /// How the critique session ended, when it ran.
    pub critique_state: Option<SessionState>,
    /// Whether search was attempted for this turn.
    pub augmented: bool,
}

impl TurnReport {
    fn new(turn: u64, question: MessageId, augmented: bool) -> Self {
        Self {
            turn,
            outcome: TurnOutcome::Answered,
            question,
            answer: None,
            critique: None,
            critique_state: None,
            augmented,
        }
    }
}

/// Model parameters for both passes.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub critique_model: String,
    pub critique_temperature: Option<f32>,
    pub critique_max_tokens: Option<u32>,
}

impl TurnSettings {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            critique_model: model.clone(),
            model,
            temperature: None,
            max_tokens: None,
            critique_temperature: None,
            critique_max_tokens: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            critique_model: config.critique_model().to_string(),
            critique_temperature: Some(config.critique.temperature),
            critique_max_tokens: config.critique.max_tokens,
        }
    }
}

/// Sequences retrieval, the primary stream, the gate and the critique stream
/// over a shared conversation log.
pub struct Orchestrator {
    consumer: StreamConsumer,
    augmenter: RetrievalAugmenter,
    settings: TurnSettings,
    store: Option<Arc<dyn LogStore>>,
    session_key: String,
    log: LiveLog,
    augmentation: AtomicBool,
    critique: AtomicBool,
    state: watch::Sender<TurnState>,
    active: Mutex<Option<CancellationToken>>,
    turns: AtomicU64,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, settings: TurnSettings) -> Self {
        let (state, _) = watch::channel(TurnState::Idle);
        Self {
            consumer: StreamConsumer::new(provider),
            augmenter: RetrievalAugmenter::disabled(),
            settings,
            store: None,
            session_key: "chat-session".into(),
            log: LiveLog::new(ConversationLog::new()),
            augmentation: AtomicBool::new(false),
            critique: AtomicBool::new(true),
            state,
            active: Mutex::new(None),
            turns: AtomicU64::new(0),
        }
    }

    /// Use `search` for prompt augmentation. The toggle stays as it is.
    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.augmenter = RetrievalAugmenter::new(Some(search));
        self
    }

    /// Persist the log to `store` under `session_key` after every completed message.
    pub fn with_store(mut self, store: Arc<dyn LogStore>, session_key: impl Into<String>) -> Self {
        self.store = Some(store);
        self.session_key = session_key.into();
        self
    }

    /// Start from an existing log (rehydrated or seeded).
    pub fn with_log(mut self, log: ConversationLog) -> Self {
        self.log = LiveLog::new(log);
        self
    }

    pub fn with_augmentation(self, enabled: bool) -> Self {
        self.augmentation.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn with_critique(self, enabled: bool) -> Self {
        self.critique.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn set_augmentation(&self, enabled: bool) {
        self.augmentation.store(enabled, Ordering::SeqCst);
    }

    pub fn augmentation_enabled(&self) -> bool {
        self.augmentation.load(Ordering::SeqCst)
    }

    /// Whether a search backend is configured at all.
    pub fn search_available(&self) -> bool {
        self.augmenter.is_available()
    }

    pub fn set_critique(&self, enabled: bool) {
        self.critique.store(enabled, Ordering::SeqCst);
    }

    pub fn critique_enabled(&self) -> bool {
        self.critique.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TurnState> {
        self.state.subscribe()
    }

    /// Observe log snapshots; each mutation publishes a new one.
    pub fn subscribe(&self) -> watch::Receiver<LogSnapshot> {
        self.log.subscribe()
    }

    pub fn snapshot(&self) -> LogSnapshot {
        self.log.snapshot()
    }

    /// Cancel the active turn. Returns whether a turn was running.
    ///
    /// Calling it again, or with no turn running, does nothing.
    pub fn cancel(&self) -> bool {
        match self.active_slot().as_ref() {
            Some(token) => {
                if !token.is_cancelled() {
                    info!("Cancelling active turn");
                }
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the whole conversation. Rejected while a turn is running.
    ///
    /// Clearing holds the turn slot until the store is cleared too, so a
    /// submission racing with it is refused as `Busy`.
    pub async fn clear(&self) -> Result<(), TurnError> {
        let _token = self.begin_turn()?;
        let _guard = TurnGuard { orchestrator: self };
        self.log.clear();
        if let Some(store) = &self.store {
            if let Err(e) = store.clear(&self.session_key).await {
                warn!(store = store.name(), error = %e, "Failed to clear persisted session");
            }
        }
        Ok(())
    }

    /// Run one complete turn for `text`.
    ///
    /// Resolves when the turn is back to `Idle`. Cancellation is reported in
    /// the returned [`TurnReport`], not as an error.
    pub async fn submit(&self, text: &str) -> Result<TurnReport, TurnError> {
        if text.trim().is_empty() {
            return Err(TurnError::EmptyInput);
        }

        let token = self.begin_turn()?;
        let _guard = TurnGuard { orchestrator: self };
        let turn = self.turns.fetch_add(1, Ordering::SeqCst) + 1;
        let augment = self.augmentation_enabled();
        info!(turn, augment, "Turn started");

        let question = self.log.push_user(text);
        self.persist().await;
        let mut report = TurnReport::new(turn, question, augment);

        let prompt = if augment {
            self.transition(TurnState::Augmenting);
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(turn, "Turn aborted during retrieval");
                    report.outcome = TurnOutcome::Aborted;
                    return Ok(report);
                }
                prompt = self.augmenter.augment(text) => prompt,
            }
        } else {
            text.to_string()
        };

        self.transition(TurnState::PrimaryStreaming);
        let primary = self.consumer.run(self.primary_spec(prompt), &self.log, &token).await;

        let answer_handle = match primary {
            StreamOutcome::Done { target, deltas } => {
                debug!(turn, deltas, "Primary answer complete");
                self.persist().await;
                target
            }
            StreamOutcome::Failed { target, error } => {
                warn!(turn, error = %error, "Primary stream failed");
                if let Some(partial) = target {
                    debug!(turn, message = %partial.id(), "Keeping partial answer");
                }
                report.answer = Some(self.log.push_frozen(Role::Assistant, APOLOGY_TEXT));
                report.outcome = TurnOutcome::Failed;
                self.persist().await;
                return Ok(report);
            }
            StreamOutcome::Cancelled { target } => {
                info!(turn, "Turn aborted during primary stream");
                report.answer = target.map(|t| t.id());
                report.outcome = TurnOutcome::Aborted;
                if target.is_some() {
                    self.persist().await;
                }
                return Ok(report);
            }
        };
        report.answer = Some(answer_handle.id());

        if token.is_cancelled() {
            report.outcome = TurnOutcome::Aborted;
            return Ok(report);
        }

        self.transition(TurnState::Gating);
        let answer = self.log.content(answer_handle).unwrap_or_default();
        let reason = if self.critique_enabled() {
            critique_gate::assess(text, &answer)
        } else {
            None
        };
        let Some(reason) = reason else {
            debug!(turn, "Critique gate closed");
            info!(turn, outcome = "answered", "Turn finished");
            return Ok(report);
        };

        self.transition(TurnState::CritiqueStreaming);
        debug!(turn, ?reason, "Critique gate opened");
        let critique_token = token.child_token();
        let critique = self
            .consumer
            .run(self.critique_spec(text, &answer, reason), &self.log, &critique_token)
            .await;

        report.critique_state = Some(critique.state());
        report.critique = critique.target().map(|t| t.id());
        match critique {
            StreamOutcome::Done { deltas, .. } => {
                debug!(turn, deltas, "Critique complete");
            }
            StreamOutcome::Failed { error, .. } => {
                warn!(turn, error = %error, "Critique stream failed");
            }
            StreamOutcome::Cancelled { .. } => {
                info!(turn, "Turn aborted during critique");
                report.outcome = TurnOutcome::Aborted;
            }
        }
        if report.critique.is_some() {
            self.persist().await;
        }

        info!(turn, outcome = ?report.outcome, "Turn finished");
        Ok(report)
    }

    fn primary_spec(&self, prompt: String) -> StreamSpec {
        let request = ProviderRequest::streaming(&self.settings.model, prompt)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);
        StreamSpec::new(request, Role::Assistant)
    }

    fn critique_spec(&self, question: &str, answer: &str, reason: CritiqueReason) -> StreamSpec {
        let mut request = ProviderRequest::streaming(
            &self.settings.critique_model,
            format!(
                "用户的问题：\n{question}\n\n助手的回答：\n{answer}\n\n\
                 请对上述回答进行审视和补充。直接给出补充内容，不要写开场白。"
            ),
        )
        .with_temperature(self.settings.critique_temperature)
        .with_max_tokens(self.settings.critique_max_tokens);
        request.messages.insert(0, PromptMessage::system(CRITIC_SYSTEM_PROMPT));

        StreamSpec::new(request, Role::Critic).with_preamble(format!("{}\n\n", reason.opening()))
    }

    fn active_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_turn(&self) -> Result<CancellationToken, TurnError> {
        let mut slot = self.active_slot();
        if slot.is_some() {
            debug!("Turn rejected: another turn is active");
            return Err(TurnError::Busy);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(token)
    }

    fn end_turn(&self) {
        self.active_slot().take();
        let frozen = self.log.freeze_all();
        if frozen > 0 {
            debug!(frozen, "Froze messages left open by an unwound turn");
        }
        self.transition(TurnState::Idle);
    }

    fn transition(&self, next: TurnState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = previous.as_str(), to = next.as_str(), "Turn state");
        }
    }

    /// Best-effort snapshot save; failures never affect the turn.
    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.log.snapshot();
        if let Err(e) = store.save(&self.session_key, &snapshot).await {
            warn!(store = store.name(), error = %e, "Failed to persist conversation");
        }
    }
}

/// Returns the orchestrator to `Idle` however `submit` exits, including when
/// its future is dropped mid-turn.
struct TurnGuard<'a> {
    orchestrator: &'a Orchestrator,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.end_turn();
    }
}

/// Load the persisted log for `session`.
///
/// `None` when nothing was persisted; a failed load is logged and treated the
/// same way, so startup always gets a usable log.
pub async fn restore_log(store: &dyn LogStore, session: &str) -> Option<ConversationLog> {
    match store.load(session).await {
        Ok(Some(messages)) => {
            debug!(store = store.name(), count = messages.len(), "Conversation restored");
            Some(ConversationLog::from_messages(messages))
        }
        Ok(None) => None,
        Err(e) => {
            warn!(store = store.name(), error = %e, "Failed to restore conversation, starting empty");
            None
        }
    }
}

/// The log a session starts from: the restored one, or else a fresh log
/// opening with `greeting` when one is configured.
pub fn seed_log(restored: Option<ConversationLog>, greeting: Option<&str>) -> ConversationLog {
    if let Some(log) = restored {
        return log;
    }
    let mut log = ConversationLog::new();
    if let Some(greeting) = greeting {
        log.push_frozen(Role::Assistant, greeting);
    }
    log
}
