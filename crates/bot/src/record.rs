//! JSONL record stream. One JSON object per line, one file per
//! session, plus a bounded broadcast channel so a live observer (e.g. the
//! swarm manager) can tail events without re-reading the file.

use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RecordEvent {
    #[serde(rename = "transport.bytes_in")]
    TransportBytesIn { t: u64, len: usize, payload_b64: Option<String> },
    #[serde(rename = "transport.bytes_out")]
    TransportBytesOut { t: u64, len: usize, payload_b64: String },
    #[serde(rename = "screen.changed")]
    ScreenChanged { t: u64, hash: u64, text: String },
    #[serde(rename = "screen.unchanged")]
    ScreenUnchanged { t: u64, hash: u64, count: u32 },
    #[serde(rename = "prompt.detected")]
    PromptDetected { t: u64, id: String, input_kind: String, matched_text: String },
    #[serde(rename = "action.executed")]
    ActionExecuted { t: u64, action: String, params: serde_json::Value, result: String },
    #[serde(rename = "orientation.updated")]
    OrientationUpdated { t: u64, sector: i64, credits: i64, holds_used: i64, holds_total: i64, turns_remaining: i64 },
    #[serde(rename = "llm.request")]
    LlmRequest { t: u64, provider: String, mode: String },
    #[serde(rename = "llm.response")]
    LlmResponse { t: u64, provider: String, raw: String },
    #[serde(rename = "llm.intervention")]
    LlmIntervention { t: u64, goal: String },
    #[serde(rename = "error")]
    Error { t: u64, error_kind: String, details: String },
}

impl RecordEvent {
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::TransportBytesIn { t, .. }
            | Self::TransportBytesOut { t, .. }
            | Self::ScreenChanged { t, .. }
            | Self::ScreenUnchanged { t, .. }
            | Self::PromptDetected { t, .. }
            | Self::ActionExecuted { t, .. }
            | Self::OrientationUpdated { t, .. }
            | Self::LlmRequest { t, .. }
            | Self::LlmResponse { t, .. }
            | Self::LlmIntervention { t, .. }
            | Self::Error { t, .. } => *t,
        }
    }
}

/// Appends events to a JSONL file and fans them out on a broadcast
/// channel. All recorded events within one session are totally ordered
/// by the monotonic timestamp the caller supplies.
pub struct RecordLog {
    file: Option<std::fs::File>,
    tx: broadcast::Sender<RecordEvent>,
    last_hash: Option<u64>,
    unchanged_run: u32,
}

impl RecordLog {
    pub fn new(path: Option<&Path>) -> std::io::Result<Self> {
        let file = match path {
            Some(p) => Some(std::fs::OpenOptions::new().create(true).append(true).open(p)?),
            None => None,
        };
        let (tx, _rx) = broadcast::channel(1024);
        Ok(Self { file, tx, last_hash: None, unchanged_run: 0 })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.tx.subscribe()
    }

    /// Record a screen snapshot, deduplicating by hash: an unchanged hash
    /// bumps a count-only event instead of re-recording the full text.
    pub fn record_screen(&mut self, t: u64, hash: u64, text: &str) {
        if self.last_hash == Some(hash) {
            self.unchanged_run += 1;
            self.push(RecordEvent::ScreenUnchanged { t, hash, count: self.unchanged_run });
        } else {
            self.last_hash = Some(hash);
            self.unchanged_run = 0;
            self.push(RecordEvent::ScreenChanged { t, hash, text: text.to_string() });
        }
    }

    pub fn push(&mut self, event: RecordEvent) {
        if let Some(file) = self.file.as_mut() {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = writeln!(file, "{line}");
            }
        }
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
