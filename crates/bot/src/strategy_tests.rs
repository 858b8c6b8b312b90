use super::*;
use crate::knowledge::SectorKnowledge;

fn port(id: i64, code: &str) -> SectorKnowledge {
    let mut s = SectorKnowledge::new(id);
    s.has_port = true;
    s.port_class = Some(code.to_string());
    let (buys, sells) = crate::knowledge::port_class_masks(code).unwrap();
    s.port_buys = buys;
    s.port_sells = sells;
    s
}

#[test]
fn trade_gate_rejects_wrong_side() {
    // BBS buys fuel+organics, sells equipment. Selling fuel here is wrong side.
    let sector = port(5, "BBS");
    let action = Action::Trade { commodity: Commodity::Fuel, qty: 10, side: TradeSide::Sell };
    assert_eq!(trade_quality_gate(&action, &sector), Err(TradeRejectReason::WrongSide));
}

#[test]
fn trade_gate_allows_correct_side() {
    let sector = port(5, "BBS");
    let action = Action::Trade { commodity: Commodity::Fuel, qty: 10, side: TradeSide::Buy };
    assert_eq!(trade_quality_gate(&action, &sector), Ok(()));
}

#[test]
fn trade_gate_rejects_no_port() {
    let sector = SectorKnowledge::new(9);
    let action = Action::Trade { commodity: Commodity::Fuel, qty: 1, side: TradeSide::Buy };
    assert_eq!(trade_quality_gate(&action, &sector), Err(TradeRejectReason::NoPort));
}

#[test]
fn trade_gate_ignores_non_trade_actions() {
    let sector = SectorKnowledge::new(9);
    assert_eq!(trade_quality_gate(&Action::Wait, &sector), Ok(()));
}

#[test]
fn profitable_pair_round_trip_buys_then_warps_then_sells() {
    let mut graph = SectorGraph::default();
    let mut s5 = port(5, "BBS"); // buys fuel, buys organics, sells equipment
    s5.warps.insert(12);
    let mut s12 = port(12, "SSB"); // sells fuel, sells organics, buys equipment
    s12.warps.insert(5);
    graph.sectors.insert(5, s5);
    graph.sectors.insert(12, s12);

    let mut prices = HashMap::new();
    prices.insert((5, Commodity::Fuel), 15.0);
    prices.insert((12, Commodity::Fuel), 55.0);

    let pairs = compute_profitable_pairs(&graph, &prices, 20, 0.0, 0.0, 10);
    let best = pairs.iter().find(|p| p.commodity == Commodity::Fuel).unwrap();
    assert_eq!(best.buy_sector, 5);
    assert_eq!(best.sell_sector, 12);
    assert_eq!(best.profit, (55.0 - 15.0) * 20.0);

    let mut strategy = ProfitablePairsStrategy::new(vec![best.clone()], 20);
    let mut state = GameState { current_sector: Some(5), ..Default::default() };

    let a1 = strategy.decide(&state, graph.get(5), &graph);
    assert_eq!(a1, Action::Trade { commodity: Commodity::Fuel, qty: 20, side: TradeSide::Buy });

    let a2 = strategy.decide(&state, graph.get(5), &graph);
    assert_eq!(a2, Action::Warp { target: 12 });

    state.current_sector = Some(12);
    let a3 = strategy.decide(&state, graph.get(12), &graph);
    assert_eq!(a3, Action::Trade { commodity: Commodity::Fuel, qty: 20, side: TradeSide::Sell });
}

#[test]
fn anti_collapse_tracker_flags_drop_below_floor() {
    let mut tracker = AntiCollapseTracker::new(15);
    tracker.record(0, -10.0);
    tracker.record(1000, -20.0);
    assert!(tracker.below_floor(0.0));
    assert!(!tracker.below_floor(-100.0));
}

#[test]
fn opportunistic_sells_when_at_a_selling_port() {
    let mut strategy = OpportunisticStrategy::new();
    let graph = SectorGraph::default();
    let sector = port(1, "SBB");
    let state = GameState::default();
    let action = strategy.decide(&state, Some(&sector), &graph);
    assert!(matches!(action, Action::Trade { side: TradeSide::Sell, .. }));
}

#[test]
fn opportunistic_explores_least_visited_warp_when_no_trade() {
    let mut strategy = OpportunisticStrategy::new();
    let mut graph = SectorGraph::default();
    let mut sector = SectorKnowledge::new(1);
    sector.warps.insert(2);
    sector.warps.insert(3);
    graph.sectors.insert(1, sector.clone());
    let mut s3 = SectorKnowledge::new(3);
    s3.last_scanned_ts = 500;
    graph.sectors.insert(3, s3);

    let state = GameState::default();
    let action = strategy.decide(&state, Some(&sector), &graph);
    assert_eq!(action, Action::Warp { target: 2 }); // unscanned sector 2 preferred
}

#[test]
fn twerk_optimized_replays_precomputed_route_then_waits() {
    let mut strategy = TwerkOptimizedStrategy::new(vec![Action::Warp { target: 9 }, Action::Scan]);
    let graph = SectorGraph::default();
    let state = GameState::default();
    assert_eq!(strategy.decide(&state, None, &graph), Action::Warp { target: 9 });
    assert_eq!(strategy.decide(&state, None, &graph), Action::Scan);
    assert_eq!(strategy.decide(&state, None, &graph), Action::Wait);
}
