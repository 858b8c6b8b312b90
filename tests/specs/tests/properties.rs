//! Property-based regression coverage for the invariants that matter
//! most across arbitrary input: terminal-emulation determinism under
//! chunking, telnet IAC escaping being its own inverse, sector-graph
//! knowledge only ever growing, and net worth never going negative.

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use tw2002_bot::knowledge::{Commodity, GameState, PortScan, SectorGraph, SectorScan};
use tw2002_bot::screen::TerminalEmulator;
use tw2002_bot::telnet::{escape, unescape, IAC};

/// Splits `bytes` into arbitrary non-empty runs according to `cuts`
/// (each taken modulo the remaining length), covering everything from
/// one whole-buffer feed to a feed-per-byte worst case.
fn chunk(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut rest = bytes;
    for &c in cuts {
        if rest.is_empty() {
            break;
        }
        let take = (c % rest.len()) + 1;
        let (head, tail) = rest.split_at(take);
        chunks.push(head.to_vec());
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest.to_vec());
    }
    chunks
}

proptest! {
    /// P1: rendering is a pure function of the cumulative byte history,
    /// not of how that history arrived — feeding the same bytes as one
    /// write or as many arbitrary small writes renders identically.
    #[test]
    fn terminal_emulation_is_independent_of_feed_chunking(
        bytes in prop::collection::vec(any::<u8>(), 0..200),
        cuts in prop::collection::vec(0usize..50, 0..40),
    ) {
        let mut whole = TerminalEmulator::new(80, 25);
        whole.feed(&bytes);

        let mut chunked = TerminalEmulator::new(80, 25);
        for piece in chunk(&bytes, &cuts) {
            chunked.feed(&piece);
        }

        prop_assert_eq!(whole.render().text_hash(), chunked.render().text_hash());
    }

    /// P2: `escape` is a two-sided inverse of `unescape`, and its output
    /// never contains a lone IAC byte that a telnet peer could misread
    /// as the start of a command sequence.
    #[test]
    fn iac_escaping_round_trips_and_never_leaves_a_lone_iac(payload in prop::collection::vec(any::<u8>(), 0..200)) {
        let escaped = escape(&payload);
        prop_assert_eq!(unescape(&escaped), payload.clone());

        let mut i = 0;
        while i < escaped.len() {
            if escaped[i] == IAC {
                prop_assert_eq!(escaped.get(i + 1), Some(&IAC), "lone IAC at offset {}", i);
                i += 1;
            }
            i += 1;
        }
    }

    /// P6: an arbitrary sequence of scans against one sector never
    /// shrinks its known warps or port buy/sell masks, and once a port
    /// class is recorded it is never replaced or cleared.
    #[test]
    fn sector_knowledge_only_ever_grows(
        scans in prop::collection::vec(
            (
                prop::collection::btree_set(1i64..50, 0..6),
                prop::option::of(prop::collection::vec(prop::sample::select(vec!['B', 'S']), 3..=3)),
            ),
            0..20,
        ),
    ) {
        let mut graph = SectorGraph::default();
        let sector_id = 7;
        let mut seen_warps: BTreeSet<i64> = BTreeSet::new();
        let mut seen_port_class: Option<String> = None;

        for (warps, port_letters) in scans {
            let port = port_letters.map(|letters| PortScan { port_class: letters.into_iter().collect() });
            let scan = SectorScan { warps: warps.clone(), port };
            let _ = graph.mark_scanned(sector_id, scan, 1);

            let Some(knowledge) = graph.get(sector_id) else { continue };
            prop_assert!(seen_warps.iter().all(|w| knowledge.warps.contains(w)), "warps must never shrink");
            if let Some(prior) = &seen_port_class {
                prop_assert_eq!(knowledge.port_class.as_ref(), Some(prior), "port class must never change once set");
            }
            seen_warps = knowledge.warps.clone();
            if knowledge.port_class.is_some() {
                seen_port_class = knowledge.port_class.clone();
            }
        }
    }

    /// P10: net worth (credits plus cargo valuation) is never negative,
    /// regardless of negative credit readings or odd cargo quotes —
    /// every term is clamped nonnegative before it is summed.
    #[test]
    fn net_worth_is_never_negative(
        credits in -1_000_000i64..1_000_000i64,
        fuel_qty in -100i64..1_000i64,
        fuel_quote in -10.0f64..500.0f64,
        organics_qty in -100i64..1_000i64,
        organics_quote in -10.0f64..500.0f64,
        floor_fuel in -5.0f64..50.0f64,
    ) {
        let state = GameState { credits, ..GameState::default() };
        let cargo: HashMap<Commodity, (i64, f64)> = HashMap::from([
            (Commodity::Fuel, (fuel_qty, fuel_quote)),
            (Commodity::Organics, (organics_qty, organics_quote)),
        ]);
        let floor: HashMap<Commodity, f64> = HashMap::from([(Commodity::Fuel, floor_fuel)]);

        prop_assert!(state.net_worth(&cargo, &floor) >= 0.0);
    }
}
