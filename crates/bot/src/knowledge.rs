//! Orientation & Knowledge (C6): semantic extraction from the screen
//! grid, monotonic sector-graph knowledge, loop detection, and the
//! disorientation recovery protocol.

use std::collections::{BTreeSet, HashMap, VecDeque};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, ErrorKind};
use crate::screen::RenderedGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Commodity {
    Fuel,
    Organics,
    Equipment,
}

/// Parses a 3-letter port class code (fuel, organics, equipment order)
/// into the buy/sell masks it uniquely determines.
pub fn port_class_masks(code: &str) -> Option<(BTreeSet<Commodity>, BTreeSet<Commodity>)> {
    if code.len() != 3 {
        return None;
    }
    let commodities = [Commodity::Fuel, Commodity::Organics, Commodity::Equipment];
    let mut buys = BTreeSet::new();
    let mut sells = BTreeSet::new();
    for (letter, commodity) in code.chars().zip(commodities) {
        match letter.to_ascii_uppercase() {
            'B' => {
                buys.insert(commodity);
            }
            'S' => {
                sells.insert(commodity);
            }
            _ => return None,
        }
    }
    Some((buys, sells))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorKnowledge {
    pub sector_id: i64,
    pub warps: BTreeSet<i64>,
    pub has_port: bool,
    pub port_class: Option<String>,
    pub port_buys: BTreeSet<Commodity>,
    pub port_sells: BTreeSet<Commodity>,
    pub last_visited_ts: u64,
    pub last_scanned_ts: u64,
    pub danger_level: i32,
}

impl SectorKnowledge {
    pub fn new(sector_id: i64) -> Self {
        Self {
            sector_id,
            warps: BTreeSet::new(),
            has_port: false,
            port_class: None,
            port_buys: BTreeSet::new(),
            port_sells: BTreeSet::new(),
            last_visited_ts: 0,
            last_scanned_ts: 0,
            danger_level: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortScan {
    pub port_class: String,
}

#[derive(Debug, Clone, Default)]
pub struct SectorScan {
    pub warps: BTreeSet<i64>,
    pub port: Option<PortScan>,
}

impl SectorScan {
    pub fn is_empty(&self) -> bool {
        self.warps.is_empty() && self.port.is_none()
    }
}

/// Sector-graph knowledge, keyed by integer sector id so the cyclic warp
/// graph never needs object references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectorGraph {
    pub sectors: HashMap<i64, SectorKnowledge>,
}

impl SectorGraph {
    pub fn get(&self, sector_id: i64) -> Option<&SectorKnowledge> {
        self.sectors.get(&sector_id)
    }

    /// Merge a scan into sector knowledge, growing warps/buys/sells and
    /// only ever transitioning `port_class` from unset to set. Refuses an
    /// empty scan to avoid poisoning the cache with a false
    /// "known and empty" marker.
    pub fn mark_scanned(&mut self, sector_id: i64, scan: SectorScan, now_ts: u64) -> Result<(), BotError> {
        if scan.is_empty() {
            return Err(BotError::new(
                ErrorKind::KnowledgePoisoned,
                format!("empty scan submitted for sector {sector_id}"),
            ));
        }
        let entry = self.sectors.entry(sector_id).or_insert_with(|| SectorKnowledge::new(sector_id));
        entry.warps.extend(scan.warps.iter().copied());
        if let Some(port) = scan.port {
            entry.has_port = true;
            if entry.port_class.is_none() {
                if let Some((buys, sells)) = port_class_masks(&port.port_class) {
                    entry.port_class = Some(port.port_class);
                    entry.port_buys.extend(buys);
                    entry.port_sells.extend(sells);
                }
            }
        }
        entry.last_scanned_ts = now_ts;
        Ok(())
    }

    pub fn mark_visited(&mut self, sector_id: i64, now_ts: u64) {
        let entry = self.sectors.entry(sector_id).or_insert_with(|| SectorKnowledge::new(sector_id));
        entry.last_visited_ts = now_ts;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub current_sector: Option<i64>,
    pub sector_confirmed: bool,
    pub credits: i64,
    pub holds_used: i64,
    pub holds_total: i64,
    pub turns_remaining: i64,
    pub credits_verified: bool,
    pub credits_last_verified_ts: u64,
    pub net_worth_estimate: f64,
    pub pending_trade: bool,
    pub recent_actions: VecDeque<(String, String)>,
    pub danger_cooldowns: HashMap<i64, u64>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            current_sector: None,
            sector_confirmed: false,
            credits: 0,
            holds_used: 0,
            holds_total: 0,
            turns_remaining: 0,
            credits_verified: false,
            credits_last_verified_ts: 0,
            net_worth_estimate: 0.0,
            pending_trade: false,
            recent_actions: VecDeque::with_capacity(32),
            danger_cooldowns: HashMap::new(),
        }
    }
}

const RECENT_ACTIONS_CAP: usize = 32;

impl GameState {
    pub fn push_action(&mut self, action: impl Into<String>, outcome: impl Into<String>) {
        if self.recent_actions.len() >= RECENT_ACTIONS_CAP {
            self.recent_actions.pop_front();
        }
        self.recent_actions.push_back((action.into(), outcome.into()));
    }

    /// P10: net worth is credits plus valuation of cargo, using
    /// observed-quote > parsed-hint > commodity-floor precedence, each
    /// term clamped nonnegative.
    pub fn net_worth(&self, cargo: &HashMap<Commodity, (i64, f64)>, floor: &HashMap<Commodity, f64>) -> f64 {
        let mut total = self.credits.max(0) as f64;
        for (commodity, (qty, observed_quote)) in cargo {
            let valuation = if *observed_quote > 0.0 {
                *observed_quote
            } else {
                floor.get(commodity).copied().unwrap_or(0.0).max(0.0)
            };
            total += (*qty).max(0) as f64 * valuation.max(0.0);
        }
        total
    }
}

/// Static patterns compiled once per call site. Panics are unreachable
/// since every pattern is a fixed, test-covered literal.
#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex pattern must compile")
}

/// Sector header pattern, taking the **last** occurrence on screen.
fn sector_header_regex() -> Regex {
    compile(r"Sector\s*\[\s*(\d+)\s*\]")
}

fn warps_line_regex() -> Regex {
    compile(r"Warps to Sector\(s\)\s*:\s*([0-9\s\-]+)")
}

fn port_class_regex() -> Regex {
    compile(r"Class\s*\d+\s*\(([A-Za-z]{3})\)")
}

fn credits_regex() -> Regex {
    compile(r"Credits\s*:?\s*([0-9,]+)")
}

fn holds_regex() -> Regex {
    compile(r"Holds\s*:?\s*(\d+)\s*/\s*(\d+)")
}

fn turns_regex() -> Regex {
    compile(r"Turns\s*(?:left|remaining)?\s*:?\s*(\d+)")
}

/// Extract the authoritative current sector: the last integer found
/// inside a `Sector [<n>]` occurrence anywhere on the grid.
pub fn extract_sector(grid: &RenderedGrid) -> Option<i64> {
    let text = grid.lines.join("\n");
    sector_header_regex().captures_iter(&text).last().and_then(|c| c[1].parse().ok())
}

pub fn extract_warps(grid: &RenderedGrid) -> BTreeSet<i64> {
    let text = grid.lines.join("\n");
    let mut warps = BTreeSet::new();
    if let Some(caps) = warps_line_regex().captures(&text) {
        for token in caps[1].split(|c: char| c.is_whitespace() || c == '-') {
            if let Ok(n) = token.trim().parse::<i64>() {
                warps.insert(n);
            }
        }
    }
    warps
}

pub fn extract_port_class(grid: &RenderedGrid) -> Option<String> {
    let text = grid.lines.join("\n");
    port_class_regex().captures(&text).map(|c| c[1].to_uppercase())
}

pub struct StatusExtract {
    pub credits: Option<i64>,
    pub holds_used: Option<i64>,
    pub holds_total: Option<i64>,
    pub turns_remaining: Option<i64>,
}

pub fn extract_status(grid: &RenderedGrid) -> StatusExtract {
    let text = grid.lines.join("\n");
    let credits = credits_regex().captures(&text).and_then(|c| c[1].replace(',', "").parse().ok());
    let (holds_used, holds_total) = holds_regex()
        .captures(&text)
        .map(|c| (c[1].parse().ok(), c[2].parse().ok()))
        .unwrap_or((None, None));
    let turns_remaining = turns_regex().captures(&text).and_then(|c| c[1].parse().ok());
    StatusExtract { credits, holds_used, holds_total, turns_remaining }
}

/// Runs the full orientation pass on a snapshot, updating `GameState` and
/// the sector graph. Never overwrites with less-specific data (only
/// extends via `mark_scanned`).
pub fn orient(state: &mut GameState, graph: &mut SectorGraph, grid: &RenderedGrid, now_ts: u64) {
    if let Some(sector) = extract_sector(grid) {
        state.current_sector = Some(sector);
        state.sector_confirmed = true;
        graph.mark_visited(sector, now_ts);

        let warps = extract_warps(grid);
        let port = extract_port_class(grid).map(|port_class| PortScan { port_class });
        let scan = SectorScan { warps, port };
        if !scan.is_empty() {
            let _ = graph.mark_scanned(sector, scan, now_ts);
        }
    } else {
        state.sector_confirmed = false;
    }

    let status = extract_status(grid);
    if let Some(credits) = status.credits {
        state.credits = credits;
        state.credits_verified = true;
        state.credits_last_verified_ts = now_ts;
    }
    if let Some(used) = status.holds_used {
        state.holds_used = used;
    }
    if let Some(total) = status.holds_total {
        state.holds_total = total;
    }
    if let Some(turns) = status.turns_remaining {
        state.turns_remaining = turns;
    }
}

/// Ring buffer of the last K detected prompt ids, for loop detection.
pub struct PromptRing {
    ids: VecDeque<String>,
    capacity: usize,
}

impl PromptRing {
    pub fn new(capacity: usize) -> Self {
        Self { ids: VecDeque::with_capacity(capacity.max(1)), capacity: capacity.max(1) }
    }

    pub fn push(&mut self, id: impl Into<String>) {
        if self.ids.len() >= self.capacity {
            self.ids.pop_front();
        }
        self.ids.push_back(id.into());
    }

    /// True if the most recently pushed id recurs at least `threshold`
    /// times within the ring.
    pub fn is_looping(&self, threshold: usize) -> bool {
        let Some(latest) = self.ids.back() else { return false };
        self.ids.iter().filter(|id| *id == latest).count() >= threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    SendEnter,
    SendQuit,
    SendAnchor,
    Abort,
}

/// Implements the disorientation recovery protocol: Enter, then
/// `q`, then the rules-file anchor sequence; abort after three failures.
#[derive(Debug, Default)]
pub struct RecoveryState {
    attempts: u32,
}

impl RecoveryState {
    pub fn next_action(&mut self) -> RecoveryAction {
        let action = match self.attempts {
            0 => RecoveryAction::SendEnter,
            1 => RecoveryAction::SendQuit,
            2 => RecoveryAction::SendAnchor,
            _ => RecoveryAction::Abort,
        };
        if action != RecoveryAction::Abort {
            self.attempts += 1;
        }
        action
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= 3
    }
}

#[cfg(test)]
#[path = "knowledge_tests.rs"]
mod tests;
