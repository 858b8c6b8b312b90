//! LLM Adapter (C9): builds a bounded context, calls an oracle over
//! HTTP, parses its response into a typed [`Action`], and implements
//! retry/fallback discipline.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ContextMode, LlmConfig, LlmProviderConfig};
use crate::error::{BotError, ErrorKind};
use crate::knowledge::{Commodity, GameState, SectorGraph};
use crate::record::RecordEvent;
use crate::strategy::{Action, BankOp, Strategy, TradeSide};

const SUMMARY_CHAR_BUDGET: usize = 1_600 * 4;
const FULL_CHAR_BUDGET: usize = 2_500 * 4;

#[derive(Debug, Clone, Serialize)]
pub struct AdjacentSectorInfo {
    pub sector_id: i64,
    pub port_class: Option<String>,
}

/// A compact, token-budgeted view of game state for the oracle prompt.
#[derive(Debug, Clone, Serialize)]
pub struct LlmContext {
    pub current_sector: Option<i64>,
    pub credits: i64,
    pub holds_used: i64,
    pub holds_total: i64,
    pub turns_remaining: i64,
    pub adjacent: Vec<AdjacentSectorInfo>,
    pub history: Vec<(String, String)>,
    pub mode: ContextMode,
}

impl LlmContext {
    pub fn build(
        state: &GameState,
        graph: &SectorGraph,
        sector_radius: u32,
        include_history: bool,
        max_history_items: u32,
        mode: ContextMode,
    ) -> Self {
        let mut adjacent = Vec::new();
        if let Some(current) = state.current_sector {
            let mut frontier = vec![current];
            let mut seen: HashSet<i64> = [current].into_iter().collect();
            for _ in 0..sector_radius {
                let mut next_frontier = Vec::new();
                for sector_id in &frontier {
                    if let Some(sector) = graph.get(*sector_id) {
                        for &warp in &sector.warps {
                            if seen.insert(warp) {
                                next_frontier.push(warp);
                                adjacent.push(AdjacentSectorInfo {
                                    sector_id: warp,
                                    port_class: graph.get(warp).and_then(|s| s.port_class.clone()),
                                });
                            }
                        }
                    }
                }
                frontier = next_frontier;
            }
        }

        let history = if include_history {
            state.recent_actions.iter().rev().take(max_history_items as usize).cloned().collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Self {
            current_sector: state.current_sector,
            credits: state.credits,
            holds_used: state.holds_used,
            holds_total: state.holds_total,
            turns_remaining: state.turns_remaining,
            adjacent,
            history,
            mode,
        }
    }

    pub fn known_sector_ids(&self) -> HashSet<i64> {
        let mut set: HashSet<i64> = self.adjacent.iter().map(|a| a.sector_id).collect();
        if let Some(c) = self.current_sector {
            set.insert(c);
        }
        set
    }

    pub fn to_prompt_text(&self) -> String {
        let budget = match self.mode {
            ContextMode::Summary => SUMMARY_CHAR_BUDGET,
            ContextMode::Full => FULL_CHAR_BUDGET,
        };
        let mut text = format!(
            "sector={:?} credits={} holds={}/{} turns={}\nadjacent:\n",
            self.current_sector, self.credits, self.holds_used, self.holds_total, self.turns_remaining
        );
        for a in &self.adjacent {
            text.push_str(&format!("  {} class={:?}\n", a.sector_id, a.port_class));
        }
        if !self.history.is_empty() {
            text.push_str("recent:\n");
            for (action, outcome) in &self.history {
                text.push_str(&format!("  {action} -> {outcome}\n"));
            }
        }
        text.truncate(budget);
        text
    }
}

#[derive(Debug, Deserialize)]
struct ActionWire {
    action: String,
    target: Option<i64>,
    commodity: Option<String>,
    qty: Option<i64>,
    side: Option<String>,
    amount: Option<i64>,
    op: Option<String>,
}

fn commodity_from_str(s: &str) -> Option<Commodity> {
    match s.to_lowercase().as_str() {
        "fuel" => Some(Commodity::Fuel),
        "organics" => Some(Commodity::Organics),
        "equipment" => Some(Commodity::Equipment),
        _ => None,
    }
}

fn side_from_str(s: &str) -> Option<TradeSide> {
    match s.to_lowercase().as_str() {
        "buy" => Some(TradeSide::Buy),
        "sell" => Some(TradeSide::Sell),
        _ => None,
    }
}

fn action_from_wire(wire: ActionWire) -> Option<Action> {
    match wire.action.as_str() {
        "warp" => Some(Action::Warp { target: wire.target? }),
        "trade" => Some(Action::Trade {
            commodity: commodity_from_str(&wire.commodity?)?,
            qty: wire.qty?,
            side: side_from_str(&wire.side?)?,
        }),
        "scan" => Some(Action::Scan),
        "wait" => Some(Action::Wait),
        "bank" => Some(Action::Bank {
            amount: wire.amount?,
            op: match wire.op?.as_str() {
                "deposit" => BankOp::Deposit,
                "withdraw" => BankOp::Withdraw,
                _ => return None,
            },
        }),
        "quit" => Some(Action::Quit),
        _ => None,
    }
}

fn regex_fallback_parse(raw: &str) -> Option<Action> {
    let lower = raw.to_lowercase();
    let numbers: Vec<i64> = lower.split(|c: char| !c.is_ascii_digit() && c != '-').filter_map(|t| t.parse().ok()).collect();

    if lower.contains("warp") {
        return numbers.first().map(|&target| Action::Warp { target });
    }
    if lower.contains("trade") || lower.contains("buy") || lower.contains("sell") {
        let side = if lower.contains("sell") { TradeSide::Sell } else { TradeSide::Buy };
        let commodity = [Commodity::Fuel, Commodity::Organics, Commodity::Equipment]
            .into_iter()
            .find(|c| lower.contains(&format!("{c:?}").to_lowercase()))?;
        let qty = numbers.first().copied().unwrap_or(1);
        return Some(Action::Trade { commodity, qty, side });
    }
    if lower.contains("scan") {
        return Some(Action::Scan);
    }
    if lower.contains("quit") {
        return Some(Action::Quit);
    }
    if lower.contains("bank") {
        let op = if lower.contains("withdraw") { BankOp::Withdraw } else { BankOp::Deposit };
        return Some(Action::Bank { amount: numbers.first().copied().unwrap_or(0), op });
    }
    if lower.contains("wait") {
        return Some(Action::Wait);
    }
    None
}

/// JSON-first, regex-fallback parsing, followed by validation against the
/// context (e.g. a `warp(t)` target must be a known adjacent sector).
pub fn parse_action(raw: &str, ctx: &LlmContext) -> Result<Action, BotError> {
    let action = serde_json::from_str::<ActionWire>(raw)
        .ok()
        .and_then(action_from_wire)
        .or_else(|| regex_fallback_parse(raw))
        .ok_or_else(|| BotError::new(ErrorKind::LlmInvalidResponse, format!("unparseable oracle response: {raw}")))?;

    if let Action::Warp { target } = &action {
        if !ctx.known_sector_ids().contains(target) {
            return Err(BotError::new(ErrorKind::LlmInvalidResponse, format!("warp target {target} not in known radius")));
        }
    }
    Ok(action)
}

/// Calls the configured oracle with bounded exponential-backoff retry.
pub struct LlmAdapter {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmAdapter {
    pub fn new(config: LlmConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    pub async fn request_action(&self, ctx: &LlmContext) -> Result<(Action, String), BotError> {
        let provider = self.config.active_provider();
        let prompt = ctx.to_prompt_text();
        let mut delay = provider.retry_delay_seconds;

        let mut last_err = BotError::new(ErrorKind::LlmConnectionError, "no attempts made");
        for attempt in 0..=provider.max_retries {
            match self.call_oracle(&prompt, provider).await {
                Ok(raw) => return parse_action(&raw, ctx).map(|action| (action, raw)),
                Err(e) => {
                    last_err = e;
                    if attempt < provider.max_retries {
                        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                        delay *= provider.retry_backoff_multiplier;
                    }
                }
            }
        }
        Err(last_err)
    }

    async fn call_oracle(&self, prompt: &str, provider: &LlmProviderConfig) -> Result<String, BotError> {
        let url = format!("{}/api/generate", provider.base_url.trim_end_matches('/'));
        let body = json!({ "model": provider.model, "prompt": prompt, "stream": false });

        let send = self.client.post(&url).json(&body).send();
        let response = match tokio::time::timeout(Duration::from_secs(provider.timeout_seconds), send).await {
            Err(_) => return Err(BotError::new(ErrorKind::LlmTimeout, format!("oracle call to {url} timed out"))),
            Ok(Err(e)) => return Err(BotError::new(ErrorKind::LlmConnectionError, e.to_string())),
            Ok(Ok(r)) => r,
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BotError::new(ErrorKind::LlmModelNotFound, provider.model.clone()));
        }
        response.text().await.map_err(|e| BotError::new(ErrorKind::LlmConnectionError, e.to_string()))
    }
}

/// Wraps the LLM adapter with a fallback discipline: after F
/// consecutive failures, decisions are delegated to a fallback strategy
/// for D turns before the oracle is retried.
pub struct FallbackController {
    adapter: LlmAdapter,
    fallback: Box<dyn Strategy>,
    failure_threshold: u32,
    fallback_duration_turns: u32,
    consecutive_failures: u32,
    fallback_turns_remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intervention {
    SwitchToExploration,
}

impl FallbackController {
    pub fn new(adapter: LlmAdapter, fallback: Box<dyn Strategy>, failure_threshold: u32, fallback_duration_turns: u32) -> Self {
        Self {
            adapter,
            fallback,
            failure_threshold,
            fallback_duration_turns,
            consecutive_failures: 0,
            fallback_turns_remaining: 0,
        }
    }

    pub fn is_in_fallback(&self) -> bool {
        self.fallback_turns_remaining > 0
    }

    /// An operator- or disorientation-triggered intervention sets
    /// strategy parameters rather than a single action.
    pub fn apply_intervention(&mut self, intervention: Intervention, now_ms: u64) -> RecordEvent {
        match intervention {
            Intervention::SwitchToExploration => {
                self.fallback_turns_remaining = self.fallback_turns_remaining.max(self.fallback_duration_turns);
            }
        }
        RecordEvent::LlmIntervention { t: now_ms, goal: format!("{intervention:?}") }
    }

    pub async fn decide(
        &mut self,
        ctx: &LlmContext,
        state: &GameState,
        graph: &SectorGraph,
        now_ms: u64,
    ) -> (Action, Vec<RecordEvent>) {
        if self.fallback_turns_remaining > 0 {
            self.fallback_turns_remaining -= 1;
            let sector = state.current_sector.and_then(|s| graph.get(s));
            return (self.fallback.decide(state, sector, graph), Vec::new());
        }

        let provider = self.adapter.config.provider.clone();
        let mut events = vec![RecordEvent::LlmRequest { t: now_ms, provider: provider.clone(), mode: format!("{:?}", ctx.mode) }];

        match self.adapter.request_action(ctx).await {
            Ok((action, raw)) => {
                self.consecutive_failures = 0;
                events.push(RecordEvent::LlmResponse { t: now_ms, provider, raw });
                (action, events)
            }
            Err(_) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.fallback_turns_remaining = self.fallback_duration_turns;
                    self.consecutive_failures = 0;
                }
                let sector = state.current_sector.and_then(|s| graph.get(s));
                (self.fallback.decide(state, sector, graph), events)
            }
        }
    }
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
