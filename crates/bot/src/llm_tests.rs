use super::*;
use crate::knowledge::SectorKnowledge;
use crate::strategy::OpportunisticStrategy;

fn sample_ctx() -> LlmContext {
    LlmContext {
        current_sector: Some(1),
        credits: 500,
        holds_used: 2,
        holds_total: 20,
        turns_remaining: 100,
        adjacent: vec![
            AdjacentSectorInfo { sector_id: 2, port_class: Some("BBS".into()) },
            AdjacentSectorInfo { sector_id: 3, port_class: None },
        ],
        history: vec![("warp(2)".into(), "ok".into())],
        mode: ContextMode::Summary,
    }
}

#[test]
fn builds_context_within_radius() {
    let mut graph = SectorGraph::default();
    let mut s1 = SectorKnowledge::new(1);
    s1.warps.insert(2);
    graph.sectors.insert(1, s1);
    let mut s2 = SectorKnowledge::new(2);
    s2.warps.insert(3);
    s2.port_class = Some("BBS".into());
    graph.sectors.insert(2, s2);
    graph.sectors.insert(3, SectorKnowledge::new(3));

    let state = GameState { current_sector: Some(1), ..Default::default() };
    let ctx = LlmContext::build(&state, &graph, 2, true, 10, ContextMode::Summary);

    let ids: Vec<i64> = ctx.adjacent.iter().map(|a| a.sector_id).collect();
    assert!(ids.contains(&2));
    assert!(ids.contains(&3));
    assert!(ctx.known_sector_ids().contains(&1));
}

#[test]
fn prompt_text_respects_summary_budget() {
    let mut ctx = sample_ctx();
    ctx.history = (0..2000).map(|i| (format!("action{i}"), "ok".into())).collect();
    let text = ctx.to_prompt_text();
    assert!(text.len() <= 1_600 * 4);
}

#[test]
fn parses_json_warp_action() {
    let ctx = sample_ctx();
    let raw = r#"{"action":"warp","target":2}"#;
    assert_eq!(parse_action(raw, &ctx).unwrap(), Action::Warp { target: 2 });
}

#[test]
fn parses_json_trade_action() {
    let ctx = sample_ctx();
    let raw = r#"{"action":"trade","commodity":"fuel","qty":5,"side":"buy"}"#;
    assert_eq!(
        parse_action(raw, &ctx).unwrap(),
        Action::Trade { commodity: Commodity::Fuel, qty: 5, side: TradeSide::Buy }
    );
}

#[test]
fn rejects_warp_target_outside_known_radius() {
    let ctx = sample_ctx();
    let raw = r#"{"action":"warp","target":999}"#;
    let err = parse_action(raw, &ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LlmInvalidResponse);
}

#[test]
fn falls_back_to_regex_when_json_invalid() {
    let ctx = sample_ctx();
    let raw = "I think we should warp to 2 now";
    assert_eq!(parse_action(raw, &ctx).unwrap(), Action::Warp { target: 2 });
}

#[test]
fn regex_fallback_parses_scan_and_quit_and_wait() {
    let ctx = sample_ctx();
    assert_eq!(parse_action("please scan this sector", &ctx).unwrap(), Action::Scan);
    assert_eq!(parse_action("time to quit", &ctx).unwrap(), Action::Quit);
    assert_eq!(parse_action("just wait here", &ctx).unwrap(), Action::Wait);
}

#[test]
fn unparseable_response_is_invalid_response_error() {
    let ctx = sample_ctx();
    let err = parse_action("???", &ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LlmInvalidResponse);
}

#[tokio::test]
async fn fallback_controller_switches_after_threshold_failures_and_recovers() {
    let config = LlmConfig {
        provider: "ollama".into(),
        ollama: LlmProviderConfig {
            base_url: "http://127.0.0.1:1".into(), // nothing listens here: connection fails fast
            max_retries: 0,
            retry_delay_seconds: 0.0,
            timeout_seconds: 1,
            ..LlmProviderConfig::default()
        },
        ..LlmConfig::default()
    };
    let adapter = LlmAdapter::new(config);
    let fallback = Box::new(OpportunisticStrategy::new());
    let mut controller = FallbackController::new(adapter, fallback, 2, 3);

    let ctx = sample_ctx();
    let state = GameState::default();
    let graph = SectorGraph::default();

    assert!(!controller.is_in_fallback());
    let _ = controller.decide(&ctx, &state, &graph, 0).await; // failure 1
    assert!(!controller.is_in_fallback());
    let _ = controller.decide(&ctx, &state, &graph, 0).await; // failure 2, trips threshold
    assert!(controller.is_in_fallback());

    for _ in 0..3 {
        let _ = controller.decide(&ctx, &state, &graph, 0).await;
    }
    assert!(!controller.is_in_fallback());
}

#[test]
fn intervention_forces_fallback_window() {
    let config = LlmConfig::default();
    let adapter = LlmAdapter::new(config);
    let fallback = Box::new(OpportunisticStrategy::new());
    let mut controller = FallbackController::new(adapter, fallback, 3, 5);
    assert!(!controller.is_in_fallback());
    controller.apply_intervention(Intervention::SwitchToExploration, 0);
    assert!(controller.is_in_fallback());
}
