//! Incremental decoder for OpenAI-style server-sent event streams.
//!
//! Network reads rarely line up with event boundaries, so the decoder keeps
//! the unterminated tail of the previous read (as raw bytes, which also keeps
//! multi-byte UTF-8 characters intact) and only decodes complete lines.

use serde::Deserialize;
use tracing::trace;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty `choices[0].delta.content` fragment.
    Delta(String),
    /// The `data: [DONE]` sentinel.
    Done,
}

/// Turns raw stream fragments into content deltas.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
    finished: bool,
    skipped: usize,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read and return the events it completes.
    ///
    /// Nothing is returned once the sentinel has been seen.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match self.decode_line(&line[..pos]) {
                Some(SseEvent::Done) => {
                    self.finish_with_sentinel();
                    events.push(SseEvent::Done);
                    break;
                }
                Some(event) => events.push(event),
                None => {}
            }
        }
        events
    }

    /// Signal end of input; decodes a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let tail = std::mem::take(&mut self.buffer);
        self.decode_line(&tail).into_iter().collect()
    }

    /// Whether the sentinel or end of input has been reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Count of `data:` frames that failed to decode.
    pub fn skipped_frames(&self) -> usize {
        self.skipped
    }

    fn finish_with_sentinel(&mut self) {
        self.finished = true;
        self.buffer.clear();
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        let data = line.strip_prefix(DATA_PREFIX)?;
        let data = data.strip_prefix(' ').unwrap_or(data);

        if data.trim() == DONE_SENTINEL {
            return Some(SseEvent::Done);
        }

        match serde_json::from_str::<StreamEnvelope>(data) {
            Ok(envelope) => envelope
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .map(SseEvent::Delta),
            Err(e) => {
                self.skipped += 1;
                trace!(data = %data, error = %e, "Ignoring unparseable SSE frame");
                None
            }
        }
    }
}

// --- Streaming SSE envelope ---

/// A single SSE `data: {...}` frame. Only the content delta is read.
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
