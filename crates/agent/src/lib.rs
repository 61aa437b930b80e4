//! Turn orchestration — the heart of SageChat.
//!
//! A turn follows an **Augment → Answer → Gate → Critique** cycle:
//!
//! 1. **Augment** the question with web search results (when enabled)
//! 2. **Stream** the primary answer into the conversation log
//! 3. **Gate**: decide heuristically whether the answer deserves review
//! 4. **Critique**: stream a second pass that reviews the answer
//!
//! Every stage observes the turn's cancellation token, and the log is shared
//! with renderers through immutable snapshots.

pub mod augmenter;
pub mod critique_gate;
pub mod live_log;
pub mod orchestrator;
pub mod stream_consumer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use augmenter::{RetrievalAugmenter, format_prompt};
pub use critique_gate::{CritiqueReason, assess, should_critique};
pub use live_log::LiveLog;
pub use orchestrator::{
    APOLOGY_TEXT, Orchestrator, TurnOutcome, TurnReport, TurnSettings, TurnState, restore_log,
    seed_log,
};
pub use stream_consumer::{SessionState, StreamConsumer, StreamOutcome, StreamSpec};
