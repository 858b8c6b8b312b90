use super::*;

fn sample(ts_ms: u64, turn: u32, net_worth: f64, traded: bool, succeeded: bool) -> StatusSample {
    StatusSample {
        ts_ms,
        turn,
        net_worth,
        prompts_since_last_trade: 0,
        trade_attempted: traded,
        trade_succeeded: succeeded,
        failure_reason: None,
        delta_attribution: if succeeded { Some(DeltaAttribution::Trade) } else { None },
    }
}

#[test]
fn status_reflects_latest_sample() {
    let reg = SwarmRegistry::new();
    reg.register("bot-1");
    reg.record_sample("bot-1", sample(0, 1, 1000.0, false, false));
    reg.record_sample("bot-1", sample(1000, 2, 1200.0, true, true));
    let summaries = reg.status("bot-1");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].turn, 2);
    assert_eq!(summaries[0].net_worth, 1200.0);
    assert_eq!(summaries[0].trade_success_rate, 1.0);
}

#[test]
fn no_trade_120p_flags_once_prompts_since_last_trade_reaches_120() {
    let reg = SwarmRegistry::new();
    reg.register("bot-1");
    let mut s = sample(0, 1, 1000.0, false, false);
    s.prompts_since_last_trade = 119;
    reg.record_sample("bot-1", s);
    assert!(!reg.status("bot-1")[0].no_trade_120p);

    let mut s2 = sample(1, 2, 1000.0, false, false);
    s2.prompts_since_last_trade = 120;
    reg.record_sample("bot-1", s2);
    assert!(reg.status("bot-1")[0].no_trade_120p);
}

#[test]
fn timeseries_summary_computes_net_worth_per_turn_over_the_window() {
    let reg = SwarmRegistry::new();
    reg.register("bot-1");
    reg.record_sample("bot-1", sample(0, 0, 1000.0, false, false));
    reg.record_sample("bot-1", sample(60_000, 10, 1800.0, true, true));

    let summary = reg.timeseries_summary(5, 60_000);
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].bot_id, "bot-1");
    assert!((summary[0].net_worth_per_turn - 80.0).abs() < 1e-9);
    assert_eq!(summary[0].delta_attribution.get("trade").copied().unwrap_or(0), 1);
}

#[test]
fn clear_empties_the_registry() {
    let reg = SwarmRegistry::new();
    reg.register("bot-1");
    reg.clear();
    assert!(!reg.contains("bot-1"));
    assert!(reg.status_all().is_empty());
}
