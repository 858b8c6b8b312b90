//! Fleet registry and status/timeseries aggregation.
//!
//! A `BotEntry` is the swarm's view of one bot: identity, lifecycle
//! status, and the rolling samples the status-aggregation job folds into
//! published metrics. The bot process itself pushes samples in; the
//! swarm never reaches into a bot's own `GameState`.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Cap on retained samples per bot; old samples age out so a long-lived
/// bot's timeseries memory stays bounded.
const MAX_SAMPLES_PER_BOT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Active,
    Dead,
    Retired,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaAttribution {
    Trade,
    Bank,
    Combat,
    Unknown,
}

/// One reported turn's worth of status from a bot.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusSample {
    pub ts_ms: u64,
    pub turn: u32,
    pub net_worth: f64,
    pub prompts_since_last_trade: u32,
    pub trade_attempted: bool,
    pub trade_succeeded: bool,
    pub failure_reason: Option<String>,
    pub delta_attribution: Option<DeltaAttribution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotSummary {
    pub bot_id: String,
    pub status: BotStatus,
    pub turn: u32,
    pub net_worth: f64,
    pub no_trade_120p: bool,
    pub trade_success_rate: f64,
}

struct BotEntry {
    status: BotStatus,
    samples: VecDeque<StatusSample>,
    trade_attempts: u64,
    trade_successes: u64,
    failure_reasons: HashMap<String, u64>,
    delta_attribution: HashMap<DeltaAttribution, u64>,
}

impl BotEntry {
    fn new() -> Self {
        Self {
            status: BotStatus::Active,
            samples: VecDeque::new(),
            trade_attempts: 0,
            trade_successes: 0,
            failure_reasons: HashMap::new(),
            delta_attribution: HashMap::new(),
        }
    }

    fn push(&mut self, sample: StatusSample) {
        if sample.trade_attempted {
            self.trade_attempts += 1;
            if sample.trade_succeeded {
                self.trade_successes += 1;
            }
        }
        if let Some(reason) = &sample.failure_reason {
            *self.failure_reasons.entry(reason.clone()).or_insert(0) += 1;
        }
        if let Some(attribution) = sample.delta_attribution {
            *self.delta_attribution.entry(attribution).or_insert(0) += 1;
        }
        if self.samples.len() >= MAX_SAMPLES_PER_BOT {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn latest(&self) -> Option<&StatusSample> {
        self.samples.back()
    }

    fn no_trade_120p(&self) -> bool {
        self.latest().map(|s| s.prompts_since_last_trade >= 120).unwrap_or(false)
    }

    fn trade_success_rate(&self) -> f64 {
        if self.trade_attempts == 0 {
            0.0
        } else {
            self.trade_successes as f64 / self.trade_attempts as f64
        }
    }

    fn net_worth_per_turn(&self, window_start_ms: u64) -> f64 {
        let windowed: Vec<&StatusSample> = self.samples.iter().filter(|s| s.ts_ms >= window_start_ms).collect();
        let Some(first) = windowed.first() else { return 0.0 };
        let Some(last) = windowed.last() else { return 0.0 };
        let turn_delta = last.turn.saturating_sub(first.turn).max(1);
        (last.net_worth - first.net_worth) / turn_delta as f64
    }

    fn trades_per_100_turns(&self, window_start_ms: u64) -> f64 {
        let windowed: Vec<&StatusSample> = self.samples.iter().filter(|s| s.ts_ms >= window_start_ms).collect();
        let Some(first) = windowed.first() else { return 0.0 };
        let Some(last) = windowed.last() else { return 0.0 };
        let turn_delta = last.turn.saturating_sub(first.turn).max(1) as f64;
        let trades = windowed.iter().filter(|s| s.trade_succeeded).count() as f64;
        trades / turn_delta * 100.0
    }

    /// Confidence in the windowed ROI estimate, scaled by sample count:
    /// a handful of samples should not be presented with the same
    /// confidence as hundreds.
    fn roi_confidence(&self, window_start_ms: u64) -> f64 {
        let n = self.samples.iter().filter(|s| s.ts_ms >= window_start_ms).count();
        (n as f64 / 30.0).min(1.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesSummary {
    pub bot_id: String,
    pub net_worth_per_turn: f64,
    pub trades_per_100_turns: f64,
    pub trade_success_rate: f64,
    pub no_trade_120p: bool,
    pub roi_confidence: f64,
    pub failure_reasons: HashMap<String, u64>,
    pub delta_attribution: HashMap<String, u64>,
}

/// Fleet-wide registry. One lock guards the whole map; contention is
/// bounded by the status-report cadence, which is orders of magnitude
/// slower than per-turn decision latency inside any one bot.
#[derive(Default)]
pub struct SwarmRegistry {
    bots: RwLock<HashMap<String, BotEntry>>,
}

impl SwarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bot_id: &str) {
        self.bots.write().entry(bot_id.to_owned()).or_insert_with(BotEntry::new);
    }

    pub fn set_status(&self, bot_id: &str, status: BotStatus) {
        self.bots.write().entry(bot_id.to_owned()).or_insert_with(BotEntry::new).status = status;
    }

    pub fn record_sample(&self, bot_id: &str, sample: StatusSample) {
        self.bots.write().entry(bot_id.to_owned()).or_insert_with(BotEntry::new).push(sample);
    }

    pub fn status(&self, bot_id: &str) -> Vec<BotSummary> {
        let bots = self.bots.read();
        bots.get(bot_id)
            .map(|entry| vec![Self::summarize(bot_id, entry)])
            .unwrap_or_default()
    }

    pub fn status_all(&self) -> Vec<BotSummary> {
        let bots = self.bots.read();
        let mut out: Vec<BotSummary> = bots.iter().map(|(id, entry)| Self::summarize(id, entry)).collect();
        out.sort_by(|a, b| a.bot_id.cmp(&b.bot_id));
        out
    }

    fn summarize(bot_id: &str, entry: &BotEntry) -> BotSummary {
        BotSummary {
            bot_id: bot_id.to_owned(),
            status: entry.status,
            turn: entry.latest().map(|s| s.turn).unwrap_or(0),
            net_worth: entry.latest().map(|s| s.net_worth).unwrap_or(0.0),
            no_trade_120p: entry.no_trade_120p(),
            trade_success_rate: entry.trade_success_rate(),
        }
    }

    /// Summary per bot over the trailing `window_minutes`, keyed to
    /// `now_ms` supplied by the caller (the manager owns the clock).
    pub fn timeseries_summary(&self, window_minutes: u32, now_ms: u64) -> Vec<TimeseriesSummary> {
        let window_start_ms = now_ms.saturating_sub(window_minutes as u64 * 60_000);
        let bots = self.bots.read();
        let mut out: Vec<TimeseriesSummary> = bots
            .iter()
            .map(|(id, entry)| TimeseriesSummary {
                bot_id: id.clone(),
                net_worth_per_turn: entry.net_worth_per_turn(window_start_ms),
                trades_per_100_turns: entry.trades_per_100_turns(window_start_ms),
                trade_success_rate: entry.trade_success_rate(),
                no_trade_120p: entry.no_trade_120p(),
                roi_confidence: entry.roi_confidence(window_start_ms),
                failure_reasons: entry.failure_reasons.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                delta_attribution: entry
                    .delta_attribution
                    .iter()
                    .map(|(k, v)| (format!("{k:?}").to_lowercase(), *v))
                    .collect(),
            })
            .collect();
        out.sort_by(|a, b| a.bot_id.cmp(&b.bot_id));
        out
    }

    pub fn clear(&self) {
        self.bots.write().clear();
    }

    pub fn contains(&self, bot_id: &str) -> bool {
        self.bots.read().contains_key(bot_id)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
