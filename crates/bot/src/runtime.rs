//! Bot Runtime (C10): the outer state machine tying every other component
//! together — login, the orient/decide/execute turn cycle, disorientation
//! recovery, and death handling.

use std::collections::{HashMap, VecDeque};

use crate::character::{CharacterRecord, NameGenerator};
use crate::config::Config;
use crate::detector::{InputKind, PromptDetection, PromptDetector, PromptKind};
use crate::error::{BotError, ErrorKind};
use crate::knowledge::{self, Commodity, GameState, PromptRing, RecoveryAction, RecoveryState, SectorGraph};
use crate::llm::{FallbackController, LlmAdapter, LlmContext};
use crate::orchestrator::{Orchestrator, WaitOutcome};
use crate::session::Session;
use crate::strategy::{trade_quality_gate, Action, AntiCollapseTracker, BankOp, OpportunisticStrategy, ProfitablePairsStrategy, Strategy, TradeSide, TwerkOptimizedStrategy};

/// Rule id convention: the rules file the operator supplies is expected to
/// tag the in-game sector-command prompt with this id, and (optionally) a
/// character-death screen with `DEATH_PROMPT_ID`.
const SECTOR_COMMAND_PROMPT_ID: &str = "game.command_prompt";
const DEATH_PROMPT_ID: &str = "game.character_died";

const LOGIN_TIMEOUT_MS: u64 = 15_000;
const TURN_TIMEOUT_MS: u64 = 20_000;

/// How many times the same prompt id must recur, with no credits/sector/
/// holds change in between, before it counts as a loop.
const LOOP_THRESHOLD: usize = 3;
const LOOP_RING_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Disconnected,
    LoggingIn,
    InGame,
    Recovering,
    Exiting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeOutcome {
    TargetReached { credits: i64 },
    TurnBudgetExhausted { turns_taken: u32 },
    CharacterDied { successor: Option<String> },
    OrientationLost,
}

/// Either a synchronous `Strategy` or the async LLM-backed fallback
/// controller. `Strategy::decide` is synchronous and `FallbackController`'s
/// isn't, so the runtime dispatches on this instead of forcing `llm.rs`
/// to depend on a blanket-async `Strategy` trait.
pub enum DecisionPolicy {
    Scripted(Box<dyn Strategy>),
    Llm(FallbackController, LlmContextParams),
}

#[derive(Debug, Clone)]
pub struct LlmContextParams {
    pub sector_radius: u32,
    pub include_history: bool,
    pub max_history_items: u32,
    pub mode: crate::config::ContextMode,
}

impl DecisionPolicy {
    pub fn from_config(config: &Config) -> Self {
        let ai = &config.ai_strategy;
        if ai.enabled {
            let fallback = build_scripted_strategy(&ai.fallback_strategy);
            let adapter = LlmAdapter::new(config.llm.clone());
            let controller = FallbackController::new(adapter, fallback, ai.fallback_threshold, ai.fallback_duration_turns);
            let params = LlmContextParams {
                sector_radius: ai.sector_radius,
                include_history: ai.include_history,
                max_history_items: ai.max_history_items,
                mode: ai.context_mode.clone(),
            };
            Self::Llm(controller, params)
        } else {
            Self::Scripted(build_scripted_strategy(&config.trading.strategy))
        }
    }

    async fn decide(&mut self, state: &GameState, graph: &SectorGraph, now_ms: u64) -> (Action, Vec<crate::record::RecordEvent>) {
        match self {
            Self::Scripted(strategy) => {
                let sector = state.current_sector.and_then(|s| graph.get(s));
                (strategy.decide(state, sector, graph), Vec::new())
            }
            Self::Llm(controller, params) => {
                let ctx = LlmContext::build(state, graph, params.sector_radius, params.include_history, params.max_history_items, params.mode.clone());
                controller.decide(&ctx, state, graph, now_ms).await
            }
        }
    }

    fn on_outcome(&mut self, action: &Action, outcome: &str) {
        if let Self::Scripted(strategy) = self {
            strategy.on_outcome(action, outcome);
        }
    }
}

fn build_scripted_strategy(name: &str) -> Box<dyn Strategy> {
    match name {
        "profitable_pairs" => Box::new(ProfitablePairsStrategy::new(Vec::new(), 0)),
        "twerk_optimized" => Box::new(TwerkOptimizedStrategy::new(Vec::new())),
        _ => Box::new(OpportunisticStrategy::new()),
    }
}

/// Tracks whether the same prompt id is recurring without the underlying
/// game state (sector, credits, holds) ever changing. Parallel
/// to `knowledge::PromptRing`, which only tracks ids.
struct LoopGuard {
    ids: VecDeque<String>,
    markers: VecDeque<(Option<i64>, i64, i64)>,
    capacity: usize,
}

impl LoopGuard {
    fn new(capacity: usize) -> Self {
        Self { ids: VecDeque::with_capacity(capacity), markers: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, id: String, marker: (Option<i64>, i64, i64)) {
        if self.ids.len() >= self.capacity {
            self.ids.pop_front();
            self.markers.pop_front();
        }
        self.ids.push_back(id);
        self.markers.push_back(marker);
    }

    /// True once the latest id has recurred `threshold` times with an
    /// identical state marker every time.
    fn is_stuck(&self, threshold: usize) -> bool {
        let Some(latest) = self.ids.back() else { return false };
        let matching: Vec<&(Option<i64>, i64, i64)> =
            self.ids.iter().zip(self.markers.iter()).filter(|(id, _)| *id == latest).map(|(_, m)| m).collect();
        matching.len() >= threshold && matching.windows(2).all(|w| w[0] == w[1])
    }
}

pub struct BotRuntime {
    session: Session,
    orchestrator: Orchestrator,
    detector: PromptDetector,
    config: Config,
    state: GameState,
    graph: SectorGraph,
    policy: DecisionPolicy,
    character: CharacterRecord,
    name_generator: NameGenerator,
    prompt_ring: PromptRing,
    loop_guard: LoopGuard,
    recovery: RecoveryState,
    anti_collapse: Option<AntiCollapseTracker>,
    cargo: HashMap<Commodity, (i64, f64)>,
    commodity_floor: HashMap<Commodity, f64>,
    runtime_state: RuntimeState,
    turns_taken: u32,
}

impl BotRuntime {
    pub fn new(
        session: Session,
        detector: PromptDetector,
        config: Config,
        character: CharacterRecord,
        name_generator: NameGenerator,
        pages_per_command: u32,
    ) -> Self {
        let policy = DecisionPolicy::from_config(&config);
        let anti_collapse = config.trading.anti_collapse.enabled.then(|| AntiCollapseTracker::new(config.trading.anti_collapse.window_minutes));
        let commodity_floor =
            HashMap::from([(Commodity::Fuel, 1.0), (Commodity::Organics, 1.0), (Commodity::Equipment, 1.0)]);
        Self {
            session,
            orchestrator: Orchestrator::new(pages_per_command),
            detector,
            config,
            state: GameState::default(),
            graph: SectorGraph::default(),
            policy,
            character,
            name_generator,
            prompt_ring: PromptRing::new(LOOP_RING_CAPACITY),
            loop_guard: LoopGuard::new(LOOP_RING_CAPACITY),
            recovery: RecoveryState::default(),
            anti_collapse,
            cargo: HashMap::new(),
            commodity_floor,
            runtime_state: RuntimeState::Disconnected,
            turns_taken: 0,
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.runtime_state
    }

    pub fn game_state(&self) -> &GameState {
        &self.state
    }

    /// Drives the full lifecycle: log in, then run turns until the
    /// configured target, turn budget, death, or unrecoverable
    /// disorientation ends the session.
    pub async fn run(&mut self) -> Result<RuntimeOutcome, BotError> {
        self.runtime_state = RuntimeState::LoggingIn;
        self.login().await?;
        self.runtime_state = RuntimeState::InGame;

        loop {
            if let Some(target) = self.config.session.target_credits {
                if self.state.credits >= 0 && self.state.credits as u64 >= target {
                    return Ok(RuntimeOutcome::TargetReached { credits: self.state.credits });
                }
            }
            if self.turns_taken >= self.config.session.max_turns_per_session {
                return Ok(RuntimeOutcome::TurnBudgetExhausted { turns_taken: self.turns_taken });
            }

            match self.run_turn().await {
                Ok(TurnOutcome::Continue) => {}
                Ok(TurnOutcome::Died) => {
                    let successor = self.handle_death();
                    return Ok(RuntimeOutcome::CharacterDied { successor });
                }
                Err(e) if e.kind == ErrorKind::OrientationLost => {
                    self.runtime_state = RuntimeState::Exiting;
                    return Ok(RuntimeOutcome::OrientationLost);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn login(&mut self) -> Result<(), BotError> {
        loop {
            let outcome = self.orchestrator.wait_and_respond(&mut self.session, &self.detector, None, LOGIN_TIMEOUT_MS).await?;
            let detection = match outcome {
                WaitOutcome::Detected(d) => d,
                WaitOutcome::StableUnknown => {
                    return Err(BotError::new(ErrorKind::PromptTimeout, "login stalled on an unrecognized stable screen"))
                }
            };
            self.record_detection(&detection);

            if detection.prompt_id == SECTOR_COMMAND_PROMPT_ID {
                return Ok(());
            }

            match detection.kind {
                PromptKind::LoginName => {
                    let name = self.character.name.clone();
                    self.orchestrator.send_input(&mut self.session, &name, InputKind::MultiKey).await?;
                }
                PromptKind::LoginPass | PromptKind::GamePass => {
                    let password = self.config.character.password.clone();
                    self.orchestrator.send_input(&mut self.session, &password, InputKind::MultiKey).await?;
                    self.check_password_echo(&password).await?;
                }
                PromptKind::Confirm => {
                    self.orchestrator.send_input(&mut self.session, "Y", InputKind::SingleKey).await?;
                }
                PromptKind::Menu => {
                    let selection = self.config.character.game_selection.clone();
                    self.orchestrator.send_input(&mut self.session, &selection, InputKind::SingleKey).await?;
                }
                PromptKind::Input => {
                    let reply = if detection.prompt_id.contains("ship") {
                        self.character.ship_name.clone().unwrap_or_else(|| self.character.name.clone())
                    } else {
                        self.character.name.clone()
                    };
                    self.orchestrator.send_input(&mut self.session, &reply, InputKind::MultiKey).await?;
                }
                PromptKind::Pause => {
                    self.orchestrator.send_input(&mut self.session, "", InputKind::AnyKey).await?;
                }
                PromptKind::Unknown => {
                    return Err(BotError::new(ErrorKind::UnexpectedPrompt, detection.prompt_id.clone()));
                }
            }
        }
    }

    /// Verifies the password echo against the visible asterisk count.
    /// TWGS variants differ on whether the password is even echoed, so a
    /// mismatch is logged rather than treated as a hard login failure.
    async fn check_password_echo(&mut self, password: &str) -> Result<(), BotError> {
        let snapshot = self.session.read(500).await?;
        let asterisks = snapshot.grid.lines.iter().flat_map(|l| l.chars()).filter(|&c| c == '*').count();
        if asterisks > 0 && asterisks != password.len() {
            tracing::debug!(expected = password.len(), saw = asterisks, "password echo asterisk count mismatch");
        }
        Ok(())
    }

    async fn run_turn(&mut self) -> Result<TurnOutcome, BotError> {
        let outcome = self.orchestrator.wait_and_respond(&mut self.session, &self.detector, None, TURN_TIMEOUT_MS).await?;
        let detection = match outcome {
            WaitOutcome::Detected(d) => d,
            WaitOutcome::StableUnknown => return self.recover().await,
        };
        self.record_detection(&detection);

        if detection.prompt_id == DEATH_PROMPT_ID {
            return Ok(TurnOutcome::Died);
        }
        if detection.kind == PromptKind::Unknown {
            return self.recover().await;
        }

        let now = self.session.now_ms();
        let snapshot = self.session.read(0).await?;
        knowledge::orient(&mut self.state, &mut self.graph, &snapshot.grid, now);
        self.record_orientation(now);

        let marker = (self.state.current_sector, self.state.credits, self.state.holds_used);
        self.prompt_ring.push(detection.prompt_id.clone());
        self.loop_guard.push(detection.prompt_id.clone(), marker);
        if self.prompt_ring.is_looping(LOOP_THRESHOLD) && self.loop_guard.is_stuck(LOOP_THRESHOLD) {
            return self.recover().await;
        }

        if detection.prompt_id != SECTOR_COMMAND_PROMPT_ID {
            // A non-command prompt mid-turn (e.g. a leftover confirm) is
            // acknowledged with Enter and retried next cycle.
            self.orchestrator.send_input(&mut self.session, "", InputKind::AnyKey).await?;
            return Ok(TurnOutcome::Continue);
        }

        let (action, llm_events) = self.policy.decide(&self.state, &self.graph, now).await;
        for event in llm_events {
            self.session.record_event(event);
        }
        let action = self.gate_action(action);

        self.execute_action(&action).await?;
        self.turns_taken += 1;
        self.policy.on_outcome(&action, "executed");
        self.state.push_action(format!("{action:?}"), "executed");
        self.record_action(&action, "executed");
        self.update_net_worth_tracking();

        Ok(TurnOutcome::Continue)
    }

    /// Runs P7's trade quality gate; a rejected trade degrades to `Scan`
    /// (gathering the missing port information) rather than stalling.
    fn gate_action(&mut self, action: Action) -> Action {
        let Some(sector_id) = self.state.current_sector else { return action };
        let Some(sector) = self.graph.get(sector_id) else { return action };
        match trade_quality_gate(&action, sector) {
            Ok(()) => action,
            Err(reason) => {
                self.policy.on_outcome(&action, "structural_failure");
                self.state.push_action(format!("{action:?}"), reason.as_str());
                Action::Scan
            }
        }
    }

    async fn execute_action(&mut self, action: &Action) -> Result<(), BotError> {
        match action {
            Action::Warp { target } => {
                self.orchestrator.send_input(&mut self.session, "W", InputKind::SingleKey).await?;
                self.orchestrator.send_input(&mut self.session, &target.to_string(), InputKind::MultiKey).await?;
            }
            Action::Trade { commodity, qty, side } => {
                let verb = match side {
                    TradeSide::Buy => "B",
                    TradeSide::Sell => "S",
                };
                self.orchestrator.send_input(&mut self.session, verb, InputKind::SingleKey).await?;
                self.orchestrator.send_input(&mut self.session, &qty.to_string(), InputKind::MultiKey).await?;
                self.apply_trade_to_cargo(*commodity, *qty, *side);
            }
            Action::Scan => {
                self.orchestrator.send_input(&mut self.session, "D", InputKind::SingleKey).await?;
            }
            Action::Wait => {
                self.orchestrator.send_input(&mut self.session, "", InputKind::None).await?;
            }
            Action::Bank { amount, op } => {
                let verb = match op {
                    BankOp::Deposit => "D",
                    BankOp::Withdraw => "W",
                };
                self.orchestrator.send_input(&mut self.session, verb, InputKind::SingleKey).await?;
                self.orchestrator.send_input(&mut self.session, &amount.to_string(), InputKind::MultiKey).await?;
            }
            Action::Quit => {
                self.orchestrator.send_input(&mut self.session, "Q", InputKind::SingleKey).await?;
            }
        }
        Ok(())
    }

    fn apply_trade_to_cargo(&mut self, commodity: Commodity, qty: i64, side: TradeSide) {
        let entry = self.cargo.entry(commodity).or_insert((0, 0.0));
        match side {
            TradeSide::Buy => entry.0 += qty,
            TradeSide::Sell => entry.0 = (entry.0 - qty).max(0),
        }
    }

    fn update_net_worth_tracking(&mut self) {
        let Some(tracker) = &mut self.anti_collapse else { return };
        let now = self.session.now_ms();
        let net_worth = self.state.net_worth(&self.cargo, &self.commodity_floor);
        let delta = net_worth - self.state.net_worth_estimate;
        self.state.net_worth_estimate = net_worth;
        tracker.record(now, delta);
        if tracker.below_floor(self.config.trading.anti_collapse.floor_net_worth_per_turn) {
            if let DecisionPolicy::Llm(controller, _) = &mut self.policy {
                let event = controller.apply_intervention(crate::llm::Intervention::SwitchToExploration, now);
                self.session.record_event(event);
            }
        }
    }

    /// Disorientation recovery: Enter, then `q`, then the
    /// configured safe-anchor sequence, aborting after three failures.
    async fn recover(&mut self) -> Result<TurnOutcome, BotError> {
        self.runtime_state = RuntimeState::Recovering;
        let action = self.recovery.next_action();
        let result = match action {
            RecoveryAction::SendEnter => {
                self.orchestrator.send_input(&mut self.session, "", InputKind::AnyKey).await
            }
            RecoveryAction::SendQuit => {
                self.orchestrator.send_input(&mut self.session, "Q", InputKind::SingleKey).await
            }
            RecoveryAction::SendAnchor => {
                let anchor = self.config.session.recovery_anchor_sequence.clone();
                self.session.send(anchor.as_bytes()).await
            }
            RecoveryAction::Abort => {
                return Err(BotError::new(ErrorKind::OrientationLost, "recovery protocol exhausted"));
            }
        };
        result?;

        let outcome = self.orchestrator.wait_and_respond(&mut self.session, &self.detector, None, TURN_TIMEOUT_MS).await?;
        if let WaitOutcome::Detected(detection) = &outcome {
            if detection.prompt_id == SECTOR_COMMAND_PROMPT_ID {
                self.recovery.reset();
                self.runtime_state = RuntimeState::InGame;
            }
        }
        Ok(TurnOutcome::Continue)
    }

    /// Handles a character's death: retires it if multi-character support
    /// is off, otherwise spawns and names a successor (knowledge is kept
    /// in `self.graph` regardless, since the graph already belongs to the
    /// runtime rather than the character).
    fn handle_death(&mut self) -> Option<String> {
        self.character.record_death(self.state.credits, self.turns_taken);
        if !self.config.multi_character.enabled {
            self.character.retire();
            return None;
        }
        let successor_name = self.name_generator.generate_character_name(&self.config.character);
        let ship_name = self.name_generator.generate_ship_name(&self.config.character);
        let now = self.session.now_ms();
        self.character = CharacterRecord::new(successor_name.clone(), ship_name, now);
        if !self.config.multi_character.inherit_danger_cooldowns {
            self.state.danger_cooldowns.clear();
        }
        Some(successor_name)
    }

    fn record_detection(&mut self, detection: &PromptDetection) {
        let t = self.session.now_ms();
        self.session.record_event(crate::record::RecordEvent::PromptDetected {
            t,
            id: detection.prompt_id.clone(),
            input_kind: format!("{:?}", detection.input_kind),
            matched_text: detection.matched_text.clone(),
        });
    }

    fn record_orientation(&mut self, t: u64) {
        let Some(sector) = self.state.current_sector else { return };
        self.session.record_event(crate::record::RecordEvent::OrientationUpdated {
            t,
            sector,
            credits: self.state.credits,
            holds_used: self.state.holds_used,
            holds_total: self.state.holds_total,
            turns_remaining: self.state.turns_remaining,
        });
    }

    fn record_action(&mut self, action: &Action, result: &str) {
        let t = self.session.now_ms();
        let params = serde_json::to_value(action).unwrap_or(serde_json::Value::Null);
        self.session.record_event(crate::record::RecordEvent::ActionExecuted {
            t,
            action: format!("{action:?}"),
            params,
            result: result.to_string(),
        });
    }
}

#[derive(Debug)]
enum TurnOutcome {
    Continue,
    Died,
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
