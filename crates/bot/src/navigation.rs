//! Navigation (C7): BFS shortest-path routing over the sector graph with
//! danger-aware, knowledge-aware tie-breaking.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::knowledge::SectorGraph;

fn cooldown_clear(danger_cooldowns: &HashMap<i64, u64>, sector: i64, now_ts: u64) -> bool {
    match danger_cooldowns.get(&sector) {
        Some(expiry) => now_ts >= *expiry,
        None => true,
    }
}

fn previously_scanned(graph: &SectorGraph, sector: i64) -> bool {
    graph.get(sector).map(|s| s.last_scanned_ts > 0).unwrap_or(false)
}

/// Ordering key for neighbor expansion: (a) cooldown-clear sectors first,
/// (b) previously-scanned sectors first, (c) lowest numeric id.
fn tie_break_key(graph: &SectorGraph, danger_cooldowns: &HashMap<i64, u64>, now_ts: u64, sector: i64) -> (bool, bool, i64) {
    (!cooldown_clear(danger_cooldowns, sector, now_ts), !previously_scanned(graph, sector), sector)
}

/// Shortest warp path from `from` to `to`. Returns `None` (`no_route`)
/// when the target is unreachable with current knowledge.
pub fn find_path(
    graph: &SectorGraph,
    from: i64,
    to: i64,
    danger_cooldowns: &HashMap<i64, u64>,
    now_ts: u64,
) -> Option<Vec<i64>> {
    if from == to {
        return Some(vec![from]);
    }

    let mut visited = HashSet::new();
    visited.insert(from);
    let mut parent: HashMap<i64, i64> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        let mut neighbors: Vec<i64> = graph.get(current).map(|s| s.warps.iter().copied().collect()).unwrap_or_default();
        neighbors.sort_by_key(|&s| tie_break_key(graph, danger_cooldowns, now_ts, s));

        for neighbor in neighbors {
            if !visited.insert(neighbor) {
                continue;
            }
            parent.insert(neighbor, current);
            if neighbor == to {
                return Some(reconstruct(&parent, from, to));
            }
            queue.push_back(neighbor);
        }
    }
    None
}

fn reconstruct(parent: &HashMap<i64, i64>, from: i64, to: i64) -> Vec<i64> {
    let mut path = vec![to];
    let mut cursor = to;
    while cursor != from {
        let Some(&prev) = parent.get(&cursor) else { break };
        path.push(prev);
        cursor = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
#[path = "navigation_tests.rs"]
mod tests;
