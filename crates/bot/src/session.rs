//! Session (C3): owns one live connection end to end — transport,
//! terminal emulator, and record log — and derives the time-aware parts
//! of a screen snapshot (idleness, change age) that the otherwise
//! clock-free emulator cannot. A session is driven by exactly one task;
//! its `&mut self` methods are the enforcement of that single-writer
//! guarantee, not a runtime check.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::time::Instant;

use crate::error::{BotError, ErrorKind};
use crate::record::{RecordEvent, RecordLog};
use crate::screen::{RenderedGrid, TerminalEmulator};
use crate::telnet::Transport;

/// Upper bound on how long a single `read_available` poll blocks while
/// `wait_until` counts down toward its overall deadline.
const POLL_SLICE_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSnapshot {
    pub grid: RenderedGrid,
    pub hash: u64,
    pub cursor_at_end: bool,
    /// True once `change_age_ms` has reached the configured stability
    /// window without the hash changing again.
    pub is_idle: bool,
    pub change_age_ms: u64,
}

pub struct Session {
    transport: Transport,
    emulator: TerminalEmulator,
    record: Option<RecordLog>,
    stability_window_ms: u64,
    started_at: Instant,
    last_hash: Option<u64>,
    last_change_ms: u64,
}

impl Session {
    pub async fn connect(
        host: &str,
        port: u16,
        cols: u16,
        rows: u16,
        record_path: Option<&Path>,
        stability_window_ms: u64,
    ) -> Result<Self, BotError> {
        let transport = Transport::connect(host, port, cols, rows).await?;
        let record = RecordLog::new(record_path).map_err(|e| BotError::new(ErrorKind::WriteFailed, e.to_string()))?;
        Ok(Self {
            transport,
            emulator: TerminalEmulator::new(cols, rows),
            record: Some(record),
            stability_window_ms,
            started_at: Instant::now(),
            last_hash: None,
            last_change_ms: 0,
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn subscribe_records(&self) -> Option<tokio::sync::broadcast::Receiver<RecordEvent>> {
        self.record.as_ref().map(|r| r.subscribe())
    }

    /// Pushes a non-transport record event (orientation, prompt detection,
    /// action execution, LLM activity, errors) through the same log.
    pub fn record_event(&mut self, event: RecordEvent) {
        if let Some(record) = &mut self.record {
            record.push(event);
        }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), BotError> {
        self.transport.send(payload).await?;
        let t = self.now_ms();
        if let Some(record) = &mut self.record {
            record.push(RecordEvent::TransportBytesOut { t, len: payload.len(), payload_b64: BASE64.encode(payload) });
        }
        Ok(())
    }

    /// Read whatever is available within `timeout_ms` and return the
    /// resulting snapshot. An empty read still yields a snapshot: the
    /// screen may have just crossed the stability window with no new
    /// bytes at all.
    pub async fn read(&mut self, timeout_ms: u64) -> Result<ScreenSnapshot, BotError> {
        let bytes = self.transport.read_available(timeout_ms).await?;
        if !bytes.is_empty() {
            self.emulator.feed(&bytes);
            let t = self.now_ms();
            if let Some(record) = &mut self.record {
                record.push(RecordEvent::TransportBytesIn { t, len: bytes.len(), payload_b64: Some(BASE64.encode(&bytes)) });
            }
        }
        Ok(self.snapshot())
    }

    fn snapshot(&mut self) -> ScreenSnapshot {
        let grid = self.emulator.render();
        let hash = grid.text_hash();
        let now = self.now_ms();

        if self.last_hash != Some(hash) {
            self.last_hash = Some(hash);
            self.last_change_ms = now;
            if let Some(record) = &mut self.record {
                let rows = grid.lines.len();
                record.record_screen(now, hash, &grid.joined(rows));
            }
        }

        let change_age_ms = now.saturating_sub(self.last_change_ms);
        let is_idle = change_age_ms >= self.stability_window_ms;
        let cursor_at_end = grid.cursor_at_end();
        ScreenSnapshot { grid, hash, cursor_at_end, is_idle, change_age_ms }
    }

    /// Poll until `predicate` accepts a snapshot or `timeout_ms` elapses.
    pub async fn wait_until(
        &mut self,
        mut predicate: impl FnMut(&ScreenSnapshot) -> bool,
        timeout_ms: u64,
    ) -> Result<ScreenSnapshot, BotError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BotError::new(ErrorKind::PromptTimeout, "wait_until deadline exceeded"));
            }
            let slice_ms = remaining.as_millis().min(POLL_SLICE_MS as u128) as u64;
            let snapshot = self.read(slice_ms).await?;
            if predicate(&snapshot) {
                return Ok(snapshot);
            }
        }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.emulator.resize(cols, rows);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
