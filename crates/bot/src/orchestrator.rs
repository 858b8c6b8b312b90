//! IO Orchestrator (C5): send-then-wait-for-expected-prompt with
//! idle/stability gating, timeouts, and pagination continuation. This is
//! purely mechanical — it knows nothing about game semantics, only about
//! prompt ids and input kinds.

use std::time::Duration;

use tokio::time::Instant;

use crate::detector::{InputKind, PromptDetection, PromptDetector};
use crate::error::{BotError, ErrorKind};
use crate::session::Session;

/// An unchanged screen hash observed this many consecutive reads, with no
/// matching detection, is reported as stable but unclassified.
const STABLE_UNKNOWN_THRESHOLD: u32 = 3;

/// Fraction of the timeout elapsed before a non-idle-but-matching
/// detection is accepted anyway.
const IDLE_BUDGET_FRACTION: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Detected(PromptDetection),
    StableUnknown,
}

pub struct Orchestrator {
    pages_per_command: u32,
}

impl Orchestrator {
    pub fn new(pages_per_command: u32) -> Self {
        Self { pages_per_command }
    }

    /// `single_key` sends one byte; `multi_key` sends the string then a
    /// separate CR write (TWGS can misread CR concatenated onto text);
    /// `any_key` sends space; `none` sends nothing.
    pub async fn send_input(&self, session: &mut Session, keys: &str, input_kind: InputKind) -> Result<(), BotError> {
        match input_kind {
            InputKind::SingleKey => session.send(keys.as_bytes()).await,
            InputKind::MultiKey => {
                session.send(keys.as_bytes()).await?;
                session.send(b"\r").await
            }
            InputKind::AnyKey => session.send(b" ").await,
            InputKind::None => Ok(()),
        }
    }

    /// Waits for a prompt detection, auto-continuing pagination prompts
    /// (bounded by `pages_per_command`) until a non-pagination detection
    /// or a stable-unknown screen is reached.
    pub async fn wait_and_respond(
        &self,
        session: &mut Session,
        detector: &PromptDetector,
        expected_prompt_id: Option<&str>,
        timeout_ms: u64,
    ) -> Result<WaitOutcome, BotError> {
        let mut pages = 0u32;
        loop {
            let outcome = self.wait_once(session, detector, expected_prompt_id, timeout_ms).await?;
            let WaitOutcome::Detected(detection) = &outcome else { return Ok(outcome) };

            let is_pagination = detector.rule(&detection.prompt_id).map(|r| r.is_pagination()).unwrap_or(false);
            if is_pagination && pages < self.pages_per_command {
                pages += 1;
                session.send(b" ").await?;
                continue;
            }
            return Ok(outcome);
        }
    }

    async fn wait_once(
        &self,
        session: &mut Session,
        detector: &PromptDetector,
        expected_prompt_id: Option<&str>,
        timeout_ms: u64,
    ) -> Result<WaitOutcome, BotError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut last_hash: Option<u64> = None;
        let mut unchanged_count = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BotError::new(ErrorKind::PromptTimeout, "wait_and_respond deadline exceeded"));
            }
            let elapsed_fraction = 1.0 - (remaining.as_millis() as f64 / timeout_ms.max(1) as f64);
            let slice_ms = remaining.as_millis().min(200) as u64;
            let snapshot = session.read(slice_ms).await?;

            if last_hash == Some(snapshot.hash) {
                unchanged_count += 1;
            } else {
                unchanged_count = 0;
                last_hash = Some(snapshot.hash);
            }

            if let Some(detection) = detector.detect(&snapshot.grid, snapshot.cursor_at_end) {
                let matches_expected = expected_prompt_id.map(|id| id == detection.prompt_id).unwrap_or(true);
                let idle_ok = snapshot.is_idle || elapsed_fraction >= IDLE_BUDGET_FRACTION;
                if matches_expected && idle_ok {
                    return Ok(WaitOutcome::Detected(detection));
                }
            }

            if unchanged_count >= STABLE_UNKNOWN_THRESHOLD {
                return Ok(WaitOutcome::StableUnknown);
            }
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
