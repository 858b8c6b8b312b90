//! Strategies: pluggable decision policies. `Strategy` is a
//! capability set — `decide` plus `on_outcome` — over a closed `Action`
//! sum type.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::knowledge::{Commodity, GameState, SectorGraph, SectorKnowledge};
use crate::navigation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankOp {
    Deposit,
    Withdraw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Warp { target: i64 },
    Trade { commodity: Commodity, qty: i64, side: TradeSide },
    Scan,
    Wait,
    Bank { amount: i64, op: BankOp },
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeRejectReason {
    WrongSide,
    NoPort,
    NoInteraction,
}

impl TradeRejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongSide => "wrong_side",
            Self::NoPort => "no_port",
            Self::NoInteraction => "no_interaction",
        }
    }
}

/// Trade quality gate: a trade on the wrong side of the port's
/// class mask is rejected before it ever reaches the orchestrator/transport.
pub fn trade_quality_gate(action: &Action, sector: &SectorKnowledge) -> Result<(), TradeRejectReason> {
    let Action::Trade { commodity, qty, side } = action else { return Ok(()) };
    if *qty <= 0 {
        return Ok(());
    }
    if !sector.has_port {
        return Err(TradeRejectReason::NoPort);
    }
    let allowed = match side {
        TradeSide::Buy => sector.port_buys.contains(commodity),
        TradeSide::Sell => sector.port_sells.contains(commodity),
    };
    if !allowed {
        let interacts = sector.port_buys.contains(commodity) || sector.port_sells.contains(commodity);
        return Err(if interacts { TradeRejectReason::WrongSide } else { TradeRejectReason::NoInteraction });
    }
    Ok(())
}

pub trait Strategy: Send {
    fn name(&self) -> &str;
    fn decide(&mut self, state: &GameState, sector: Option<&SectorKnowledge>, graph: &SectorGraph) -> Action;
    fn on_outcome(&mut self, _action: &Action, _outcome: &str) {}
}

/// Tracks a rolling net-worth-per-turn average for the anti-collapse
/// policy: drop below the floor and the caller must downshift.
#[derive(Debug, Clone)]
pub struct AntiCollapseTracker {
    samples: VecDeque<(u64, f64)>,
    window_ms: u64,
}

impl AntiCollapseTracker {
    pub fn new(window_minutes: u32) -> Self {
        Self { samples: VecDeque::new(), window_ms: window_minutes as u64 * 60_000 }
    }

    pub fn record(&mut self, now_ts: u64, net_worth_delta: f64) {
        self.samples.push_back((now_ts, net_worth_delta));
        while let Some(&(t, _)) = self.samples.front() {
            if now_ts.saturating_sub(t) > self.window_ms {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn average_per_turn(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|(_, d)| d).sum::<f64>() / self.samples.len() as f64
    }

    pub fn below_floor(&self, floor: f64) -> bool {
        !self.samples.is_empty() && self.average_per_turn() < floor
    }
}

/// A (buy port, sell port, commodity) opportunity, precomputed from
/// shared knowledge.
#[derive(Debug, Clone)]
pub struct ProfitablePair {
    pub buy_sector: i64,
    pub sell_sector: i64,
    pub commodity: Commodity,
    pub profit: f64,
}

pub fn compute_profitable_pairs(
    graph: &SectorGraph,
    prices: &HashMap<(i64, Commodity), f64>,
    holds: i64,
    travel_cost_per_hop: f64,
    min_profit: f64,
    max_hop_radius: usize,
) -> Vec<ProfitablePair> {
    let mut pairs = Vec::new();
    for buy_sector in graph.sectors.values().filter(|s| s.has_port) {
        for sell_sector in graph.sectors.values().filter(|s| s.has_port) {
            if buy_sector.sector_id == sell_sector.sector_id {
                continue;
            }
            for commodity in [Commodity::Fuel, Commodity::Organics, Commodity::Equipment] {
                if !buy_sector.port_buys.contains(&commodity) || !sell_sector.port_sells.contains(&commodity) {
                    continue;
                }
                let Some(path) = navigation::find_path(graph, buy_sector.sector_id, sell_sector.sector_id, &HashMap::new(), 0) else {
                    continue;
                };
                if path.len().saturating_sub(1) > max_hop_radius {
                    continue;
                }
                let buy_price = prices.get(&(buy_sector.sector_id, commodity)).copied().unwrap_or(0.0);
                let sell_price = prices.get(&(sell_sector.sector_id, commodity)).copied().unwrap_or(0.0);
                let travel_cost = (path.len().saturating_sub(1)) as f64 * travel_cost_per_hop;
                let profit = (sell_price - buy_price) * holds as f64 - travel_cost;
                if profit > min_profit {
                    pairs.push(ProfitablePair { buy_sector: buy_sector.sector_id, sell_sector: sell_sector.sector_id, commodity, profit });
                }
            }
        }
    }
    pairs.sort_by(|a, b| b.profit.partial_cmp(&a.profit).unwrap_or(std::cmp::Ordering::Equal));
    pairs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairLeg {
    TravelToBuy,
    Buying,
    TravelToSell,
    Selling,
}

pub struct ProfitablePairsStrategy {
    pairs: Vec<ProfitablePair>,
    active: usize,
    leg: PairLeg,
    holds_per_trade: i64,
}

impl ProfitablePairsStrategy {
    pub fn new(pairs: Vec<ProfitablePair>, holds_per_trade: i64) -> Self {
        Self { pairs, active: 0, leg: PairLeg::TravelToBuy, holds_per_trade }
    }

    fn rotate(&mut self) {
        if !self.pairs.is_empty() {
            self.active = (self.active + 1) % self.pairs.len();
        }
        self.leg = PairLeg::TravelToBuy;
    }
}

impl Strategy for ProfitablePairsStrategy {
    fn name(&self) -> &str {
        "profitable_pairs"
    }

    fn decide(&mut self, state: &GameState, _sector: Option<&SectorKnowledge>, _graph: &SectorGraph) -> Action {
        let Some(pair) = self.pairs.get(self.active) else { return Action::Wait };
        match self.leg {
            PairLeg::TravelToBuy => {
                if state.current_sector == Some(pair.buy_sector) {
                    self.leg = PairLeg::Buying;
                    Action::Trade { commodity: pair.commodity, qty: self.holds_per_trade, side: TradeSide::Buy }
                } else {
                    Action::Warp { target: pair.buy_sector }
                }
            }
            PairLeg::Buying => {
                self.leg = PairLeg::TravelToSell;
                Action::Warp { target: pair.sell_sector }
            }
            PairLeg::TravelToSell => {
                if state.current_sector == Some(pair.sell_sector) {
                    self.leg = PairLeg::Selling;
                    Action::Trade { commodity: pair.commodity, qty: self.holds_per_trade, side: TradeSide::Sell }
                } else {
                    Action::Warp { target: pair.sell_sector }
                }
            }
            PairLeg::Selling => {
                let pair = pair.clone();
                self.rotate();
                Action::Warp { target: pair.buy_sector }
            }
        }
    }

    fn on_outcome(&mut self, action: &Action, outcome: &str) {
        if outcome == "structural_failure" {
            if let Action::Trade { .. } = action {
                self.rotate();
            }
        }
    }
}

pub struct OpportunisticStrategy {
    least_visited_warp: Option<i64>,
}

impl OpportunisticStrategy {
    pub fn new() -> Self {
        Self { least_visited_warp: None }
    }
}

impl Default for OpportunisticStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for OpportunisticStrategy {
    fn name(&self) -> &str {
        "opportunistic"
    }

    fn decide(&mut self, _state: &GameState, sector: Option<&SectorKnowledge>, graph: &SectorGraph) -> Action {
        if let Some(sector) = sector {
            if sector.has_port && !sector.port_sells.is_empty() {
                if let Some(&commodity) = sector.port_sells.iter().next() {
                    return Action::Trade { commodity, qty: 1, side: TradeSide::Sell };
                }
            }
            let mut candidates: Vec<i64> = sector.warps.iter().copied().collect();
            candidates.sort_by_key(|&w| {
                let scanned = graph.get(w).map(|s| s.last_scanned_ts).unwrap_or(0);
                (scanned, w)
            });
            if let Some(&target) = candidates.first() {
                self.least_visited_warp = Some(target);
                return Action::Warp { target };
            }
        }
        Action::Scan
    }
}

/// Consumes an externally precomputed route, executing it deterministically
/// and opaquely: each call just pops the next leg.
pub struct TwerkOptimizedStrategy {
    route: VecDeque<Action>,
}

impl TwerkOptimizedStrategy {
    pub fn new(route: Vec<Action>) -> Self {
        Self { route: route.into() }
    }
}

impl Strategy for TwerkOptimizedStrategy {
    fn name(&self) -> &str {
        "twerk_optimized"
    }

    fn decide(&mut self, _state: &GameState, _sector: Option<&SectorKnowledge>, _graph: &SectorGraph) -> Action {
        self.route.pop_front().unwrap_or(Action::Wait)
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
