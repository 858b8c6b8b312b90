//! End-to-end scenario coverage: each test below drives the real
//! telnet transport, terminal emulator, prompt detector, orchestrator,
//! and orientation pipeline over a loopback socket, or the real swarm
//! HTTP surface over an in-process router.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use tw2002_bot::character::{CharacterRecord, NameGenerator};
use tw2002_bot::config::{Config, NameComplexity};
use tw2002_bot::detector::{InputKind, PromptDetector, PromptKind, PromptRuleSpec};
use tw2002_bot::knowledge::{Commodity, GameState, PortScan, SectorGraph, SectorScan};
use tw2002_bot::llm::{FallbackController, LlmAdapter, LlmContext};
use tw2002_bot::orchestrator::Orchestrator;
use tw2002_bot::runtime::{BotRuntime, RuntimeOutcome};
use tw2002_bot::session::Session;
use tw2002_bot::strategy::{
    trade_quality_gate, Action, OpportunisticStrategy, ProfitablePair, ProfitablePairsStrategy, Strategy, TradeSide,
};

use tw2002_specs::{spawn_repeating_server, spawn_scripted_server, spawn_scripted_server_capturing, step};
use tw2002_swarm::lease::ClockFn;
use tw2002_swarm::manager::{SwarmManager, SwarmManagerConfig};

fn rule(id: &str, regex: &str, kind: PromptKind, input_kind: InputKind) -> PromptRuleSpec {
    PromptRuleSpec { id: id.into(), regex: regex.into(), input_kind, expect_cursor_at_end: None, negative_regex: None, kind, llm_hints: None }
}

fn login_rules() -> Vec<PromptRuleSpec> {
    vec![
        rule("login.menu", r"Selection \(\? for menu\)", PromptKind::Menu, InputKind::SingleKey),
        rule("login.game_password", r"Please enter the password", PromptKind::GamePass, InputKind::MultiKey),
        rule("login.name", r"What is your name", PromptKind::LoginName, InputKind::MultiKey),
        rule("login.ansi_confirm", r"Use ANSI graphics", PromptKind::Confirm, InputKind::SingleKey),
        rule("login.pause", r"\[Pause\]", PromptKind::Pause, InputKind::AnyKey),
        rule("game.command_prompt", r"Command \[", PromptKind::Input, InputKind::MultiKey),
    ]
}

async fn connected_runtime(port: u16, config: Config, character: CharacterRecord, name_generator: NameGenerator) -> BotRuntime {
    let detector = PromptDetector::from_specs(&login_rules(), 4).unwrap();
    let session = Session::connect("127.0.0.1", port, 80, 25, None, 80).await.unwrap();
    BotRuntime::new(session, detector, config, character, name_generator, 2)
}

/// Scenario 1: login through a private-game selection, a game
/// password, a name prompt, an ANSI confirmation and two pagination
/// pauses, landing on the sector-command prompt with orientation data
/// already parsed off the first command screen.
#[tokio::test]
async fn login_private_game_new_character_reaches_command_prompt() {
    let name_gen = NameGenerator::new(Some(7));
    let mut config = Config::default();
    config.character.name_complexity = NameComplexity::Simple;
    config.character.password = "game".into();
    config.character.game_selection = "A".into();
    config.session.max_turns_per_session = 1;
    let name = "Gemini".to_string();
    let character = CharacterRecord::new(name.clone(), None, 0);

    let steps = vec![
        step("Selection (? for menu): ", Some("A")),
        step("\r\nPlease enter the password: ", Some("game")),
        step("\r\nWhat is your name, adventurer? ", Some(&name)),
        step("\r\nUse ANSI graphics? ", Some("Y")),
        step("\r\n[Pause]", Some(" ")),
        step("\r\n[Pause]", Some(" ")),
        step(
            "\r\nSector  [5] in uncharted space.\r\nWarps to Sector(s) :  3 - 7\r\nCredits : 1,200   Holds  10/ 20 Turns: 500\r\nCommand [TL=00:00]:[5] (?=Help)? ",
            None,
        ),
    ];
    let (port, _server) = spawn_scripted_server(steps);

    let mut rt = connected_runtime(port, config, character, name_gen).await;
    let outcome = rt.run().await.expect("login plus one turn should complete without error");

    assert!(matches!(outcome, RuntimeOutcome::TurnBudgetExhausted { turns_taken: 1 }));
    assert_eq!(rt.game_state().current_sector, Some(5));
    assert!(rt.game_state().credits_verified);
    assert_eq!(rt.game_state().credits, 1200);
}

/// Scenario 2: a profitable pair is precomputed from shared knowledge
/// (sector 5 buys fuel at 15/unit, sector 12 sells it at 55/unit); the
/// strategy round-trips buy -> warp -> sell and the observed credits
/// delta matches the expected profit exactly.
#[tokio::test]
async fn profitable_pair_round_trip_nets_the_expected_profit() {
    let mut graph = SectorGraph::default();
    graph
        .mark_scanned(5, SectorScan { warps: [12].into_iter().collect(), port: Some(PortScan { port_class: "BBS".into() }) }, 1)
        .unwrap();
    graph
        .mark_scanned(12, SectorScan { warps: [5].into_iter().collect(), port: Some(PortScan { port_class: "SSB".into() }) }, 1)
        .unwrap();

    let pair = ProfitablePair { buy_sector: 5, sell_sector: 12, commodity: Commodity::Fuel, profit: 800.0 };
    let mut strategy = ProfitablePairsStrategy::new(vec![pair], 20);

    let mut state = GameState { current_sector: Some(5), ..GameState::default() };
    let mut credits = 2_000i64;

    let buy = strategy.decide(&state, graph.get(5), &graph);
    assert_eq!(buy, Action::Trade { commodity: Commodity::Fuel, qty: 20, side: TradeSide::Buy });
    trade_quality_gate(&buy, graph.get(5).unwrap()).expect("buying fuel at a BBS port must pass the quality gate");
    credits -= 15 * 20;

    let warp_out = strategy.decide(&state, graph.get(5), &graph);
    assert_eq!(warp_out, Action::Warp { target: 12 });
    state.current_sector = Some(12);

    let sell = strategy.decide(&state, graph.get(12), &graph);
    assert_eq!(sell, Action::Trade { commodity: Commodity::Fuel, qty: 20, side: TradeSide::Sell });
    trade_quality_gate(&sell, graph.get(12).unwrap()).expect("selling fuel at an SSB port must pass the quality gate");
    credits += 55 * 20;

    let warp_back = strategy.decide(&state, graph.get(12), &graph);
    assert_eq!(warp_back, Action::Warp { target: 5 });

    assert_eq!(credits - 2_000, 800);
}

/// Scenario 3: a server that always presents the identical command
/// prompt, with orientation never finding a sector header, trips the
/// loop guard rather than running forever; recovery exhausts after
/// three attempts and the runtime reports `OrientationLost`.
#[tokio::test]
async fn repeating_command_prompt_escalates_to_orientation_lost() {
    let name_gen = NameGenerator::new(Some(11));
    let config = Config::default();
    let character = CharacterRecord::new("Novawind", None, 0);

    let (port, _server) = spawn_repeating_server("Command [TL=00:00]:[?] (?=Help)? ");
    let mut rt = connected_runtime(port, config, character, name_gen).await;

    let outcome = rt.run().await.expect("a stuck loop must resolve, not hang");
    assert_eq!(outcome, RuntimeOutcome::OrientationLost);
}

/// Scenario 4: after the failure threshold trips, the fallback
/// strategy runs for exactly the configured duration before the
/// oracle is retried on the following decision.
#[tokio::test]
async fn llm_fallback_runs_for_exactly_the_configured_duration_then_retries_the_oracle() {
    let mut llm_config = tw2002_bot::config::LlmConfig::default();
    llm_config.provider = "ollama".into();
    llm_config.ollama.base_url = "http://127.0.0.1:1".into();
    llm_config.ollama.timeout_seconds = 1;
    llm_config.ollama.max_retries = 0;

    let adapter = LlmAdapter::new(llm_config);
    let fallback: Box<dyn Strategy> = Box::new(OpportunisticStrategy::new());
    let mut controller = FallbackController::new(adapter, fallback, 3, 10);

    let state = GameState::default();
    let graph = SectorGraph::default();
    let ctx = LlmContext::build(&state, &graph, 3, false, 0, tw2002_bot::config::ContextMode::Summary);

    for _ in 0..3 {
        controller.decide(&ctx, &state, &graph, 0).await;
    }
    assert!(controller.is_in_fallback(), "the third consecutive failure must trip the fallback window");

    for i in 0..10 {
        controller.decide(&ctx, &state, &graph, 0).await;
        let should_still_be_in_fallback = i < 9;
        assert_eq!(controller.is_in_fallback(), should_still_be_in_fallback, "fallback turn {i}");
    }

    controller.decide(&ctx, &state, &graph, 0).await;
    assert!(!controller.is_in_fallback(), "turn 11 must retry the oracle rather than continue the fallback window");
}

fn fake_clock() -> (ClockFn, Arc<AtomicU64>) {
    let now = Arc::new(AtomicU64::new(0));
    let captured = Arc::clone(&now);
    let clock: ClockFn = Arc::new(move || captured.load(Ordering::SeqCst));
    (clock, now)
}

/// Scenario 5: a hijack lease granted for 5 seconds is still valid one
/// second before expiry, rejected once expired, and a fresh `begin`
/// succeeds afterward, all observed through the real REST surface.
#[tokio::test]
async fn hijack_lease_expires_then_a_fresh_begin_succeeds_over_http() {
    let (clock, now) = fake_clock();
    let mgr = Arc::new(SwarmManager::with_clock(SwarmManagerConfig::default(), clock));
    mgr.register_bot("bot-1");
    let server = TestServer::new(tw2002_swarm::http::build_router(Arc::clone(&mgr))).unwrap();

    server.post("/bots/bot-1/hijack/begin").json(&json!({ "owner": "alice", "lease_s": 5 })).await.assert_status(StatusCode::OK);
    server.post("/bots/bot-1/hijack/send").json(&json!({ "owner": "alice", "keys": "D" })).await.assert_status(StatusCode::OK);

    now.store(6_000, Ordering::SeqCst);
    server.post("/bots/bot-1/hijack/send").json(&json!({ "owner": "alice", "keys": "D" })).await.assert_status(StatusCode::CONFLICT);

    now.store(7_000, Ordering::SeqCst);
    server.post("/bots/bot-1/hijack/begin").json(&json!({ "owner": "alice", "lease_s": 5 })).await.assert_status(StatusCode::OK);
    server.post("/bots/bot-1/hijack/send").json(&json!({ "owner": "alice", "keys": "D" })).await.assert_status(StatusCode::OK);
}

/// Scenario 6: a trade on the wrong side of a port's class mask never
/// reaches the wire. The gate rejects it, the strategy is handed a
/// "structural_failure" outcome and rotates to its next leg, and only
/// the degraded scan command (`D`) is sent instead.
#[tokio::test]
async fn trade_gate_rejection_blocks_the_wire_send_and_degrades_to_scan() {
    let mut graph = SectorGraph::default();
    graph.mark_scanned(5, SectorScan { warps: [12].into_iter().collect(), port: Some(PortScan { port_class: "SSS".into() }) }, 1).unwrap();
    graph.mark_scanned(12, SectorScan { warps: [5].into_iter().collect(), port: Some(PortScan { port_class: "SSB".into() }) }, 1).unwrap();
    let pair = ProfitablePair { buy_sector: 5, sell_sector: 12, commodity: Commodity::Fuel, profit: 800.0 };
    let mut strategy = ProfitablePairsStrategy::new(vec![pair], 20);

    let state = GameState { current_sector: Some(5), ..GameState::default() };
    let action = strategy.decide(&state, graph.get(5), &graph);
    assert_eq!(action, Action::Trade { commodity: Commodity::Fuel, qty: 20, side: TradeSide::Buy });

    let rejection = trade_quality_gate(&action, graph.get(5).unwrap()).expect_err("sector 5 does not buy fuel under class SSS");
    assert_eq!(rejection.as_str(), "wrong_side");

    let steps = vec![step("\r\nCommand [TL=00:00]:[5] (?=Help)? ", Some("D"))];
    let (port, _server, sent) = spawn_scripted_server_capturing(steps);
    let mut session = Session::connect("127.0.0.1", port, 80, 25, None, 80).await.unwrap();
    let orchestrator = Orchestrator::new(2);
    let detector = PromptDetector::from_specs(&login_rules(), 4).unwrap();
    orchestrator.wait_and_respond(&mut session, &detector, None, 5_000).await.unwrap();

    strategy.on_outcome(&action, "structural_failure");
    orchestrator.send_input(&mut session, "D", InputKind::SingleKey).await.unwrap();

    let next = strategy.decide(&state, graph.get(5), &graph);
    assert_eq!(next, Action::Warp { target: 5 }, "rotation with a single pair returns to the same buy sector");

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let wire = sent.lock().await;
    assert!(!wire.windows(1).any(|w| w == b"B"), "the rejected buy must never reach the wire");
    assert!(wire.windows(1).any(|w| w == b"D"), "the degraded scan command must reach the wire instead");
}
