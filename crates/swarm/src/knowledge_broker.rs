//! Shared knowledge broker: centralizes the sector graphs `multi_character`
//! bots draw on, so concurrent scans never race each other the way
//! fine-grained per-sector locking would invite.
//!
//! Writes to a group's graph are serialized by the group's own lock;
//! reads hand back a cloned snapshot so a caller iterating sectors never
//! observes a write landing mid-iteration.

use std::collections::HashMap;

use parking_lot::Mutex;
use tw2002_bot::config::KnowledgeSharing;
use tw2002_bot::error::BotError;
use tw2002_bot::knowledge::{SectorGraph, SectorScan};

const GLOBAL_GROUP: &str = "__shared__";

/// Resolves a bot's configured [`KnowledgeSharing`] mode into the graph
/// group key it writes through: `Shared` bots all land on one group,
/// `Independent` and `InheritOnDeath` bots each get their own.
fn group_key(bot_id: &str, sharing: KnowledgeSharing) -> String {
    match sharing {
        KnowledgeSharing::Shared => GLOBAL_GROUP.to_owned(),
        KnowledgeSharing::Independent | KnowledgeSharing::InheritOnDeath => bot_id.to_owned(),
    }
}

pub struct SharedKnowledgeBroker {
    groups: Mutex<HashMap<String, SectorGraph>>,
}

impl Default for SharedKnowledgeBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedKnowledgeBroker {
    pub fn new() -> Self {
        Self { groups: Mutex::new(HashMap::new()) }
    }

    /// Snapshot-consistent read: returns a clone of the group's graph as
    /// it stood at the moment the lock was held, never a torn view.
    pub fn snapshot(&self, bot_id: &str, sharing: KnowledgeSharing) -> SectorGraph {
        let key = group_key(bot_id, sharing);
        self.groups.lock().get(&key).cloned().unwrap_or_default()
    }

    /// Serialized write: merges one scan into the bot's group graph.
    pub fn apply_scan(
        &self,
        bot_id: &str,
        sharing: KnowledgeSharing,
        sector_id: i64,
        scan: SectorScan,
        now_ts: u64,
    ) -> Result<(), BotError> {
        let key = group_key(bot_id, sharing);
        let mut groups = self.groups.lock();
        let graph = groups.entry(key).or_default();
        graph.mark_scanned(sector_id, scan, now_ts)
    }

    pub fn mark_visited(&self, bot_id: &str, sharing: KnowledgeSharing, sector_id: i64, now_ts: u64) {
        let key = group_key(bot_id, sharing);
        let mut groups = self.groups.lock();
        groups.entry(key).or_default().mark_visited(sector_id, now_ts);
    }

    /// `inherit_on_death`: seeds a successor's independent group with a
    /// clone of the dead character's group graph, one-time, at
    /// character-death handoff.
    pub fn inherit_on_death(&self, dead_bot_id: &str, successor_bot_id: &str) {
        let mut groups = self.groups.lock();
        if let Some(graph) = groups.get(dead_bot_id).cloned() {
            groups.insert(successor_bot_id.to_owned(), graph);
        }
    }

    pub fn clear(&self) {
        self.groups.lock().clear();
    }
}

#[cfg(test)]
#[path = "knowledge_broker_tests.rs"]
mod tests;
