//! Swarm Manager: the process-wide mutable handle tying the bot registry,
//! the shared-knowledge broker, and the hijack-lease table together
//! behind the REST control plane.

use std::sync::Arc;

use tw2002_bot::config::KnowledgeSharing;
use tw2002_bot::knowledge::SectorScan;

use crate::error::{SwarmError, SwarmErrorKind};
use crate::knowledge_broker::SharedKnowledgeBroker;
use crate::lease::{system_clock, ClockFn, HijackLease, LeaseManager};
use crate::state::{BotStatus, BotSummary, StatusSample, SwarmRegistry, TimeseriesSummary};

/// Ceiling on how far a heartbeat can push a hijack lease's expiry past
/// its original grant, regardless of how many times it is renewed.
const DEFAULT_LEASE_CEILING_S: u64 = 3600;

pub struct SwarmManagerConfig {
    pub lease_ceiling_s: u64,
    pub default_knowledge_sharing: KnowledgeSharing,
}

impl Default for SwarmManagerConfig {
    fn default() -> Self {
        Self { lease_ceiling_s: DEFAULT_LEASE_CEILING_S, default_knowledge_sharing: KnowledgeSharing::Independent }
    }
}

pub struct SwarmManager {
    registry: SwarmRegistry,
    knowledge: SharedKnowledgeBroker,
    leases: LeaseManager,
    config: SwarmManagerConfig,
}

impl SwarmManager {
    pub fn new(config: SwarmManagerConfig) -> Self {
        Self {
            registry: SwarmRegistry::new(),
            knowledge: SharedKnowledgeBroker::new(),
            leases: LeaseManager::new(config.lease_ceiling_s, system_clock()),
            config,
        }
    }

    /// Build a manager with an injected clock, for deterministic lease
    /// expiry tests driving the manager as a whole rather than
    /// `LeaseManager` in isolation.
    pub fn with_clock(config: SwarmManagerConfig, clock: ClockFn) -> Self {
        Self {
            registry: SwarmRegistry::new(),
            knowledge: SharedKnowledgeBroker::new(),
            leases: LeaseManager::new(config.lease_ceiling_s, clock),
            config,
        }
    }

    // -- Control plane ---------------------------------------------------

    pub fn register_bot(&self, bot_id: &str) {
        self.registry.register(bot_id);
    }

    pub fn start(&self, bot_id: &str) {
        self.registry.set_status(bot_id, BotStatus::Active);
    }

    pub fn stop(&self, bot_id: &str) -> Result<(), SwarmError> {
        if !self.registry.contains(bot_id) {
            return Err(SwarmError::new(SwarmErrorKind::BotNotFound, bot_id));
        }
        self.registry.set_status(bot_id, BotStatus::Retired);
        Ok(())
    }

    pub fn clear(&self) {
        self.registry.clear();
        self.knowledge.clear();
    }

    /// Record a spawn composition decision (e.g. "19 dynamic + 1 AI")
    /// by registering each bot_id with its intended status; the actual
    /// process spawning is the swarm binary's concern, not the manager's:
    /// this is control-plane bookkeeping, not a process supervisor.
    pub fn spawn_composition(&self, bot_ids: &[String]) {
        for id in bot_ids {
            self.registry.register(id);
        }
    }

    // -- Status aggregation ----------------------------------------------

    pub fn report_status(&self, bot_id: &str, sample: StatusSample) {
        self.registry.record_sample(bot_id, sample);
    }

    pub fn report_death(&self, bot_id: &str) {
        self.registry.set_status(bot_id, BotStatus::Dead);
    }

    pub fn report_error(&self, bot_id: &str) {
        self.registry.set_status(bot_id, BotStatus::Errored);
    }

    pub fn status(&self, bot_id: &str) -> Result<BotSummary, SwarmError> {
        self.registry
            .status(bot_id)
            .into_iter()
            .next()
            .ok_or_else(|| SwarmError::new(SwarmErrorKind::BotNotFound, bot_id))
    }

    pub fn status_all(&self) -> Vec<BotSummary> {
        self.registry.status_all()
    }

    pub fn timeseries_summary(&self, window_minutes: u32, now_ms: u64) -> Vec<TimeseriesSummary> {
        self.registry.timeseries_summary(window_minutes, now_ms)
    }

    // -- Shared knowledge --------------------------------------------------

    pub fn apply_scan(&self, bot_id: &str, sector_id: i64, scan: SectorScan, now_ts: u64) -> Result<(), SwarmError> {
        self.knowledge
            .apply_scan(bot_id, self.config.default_knowledge_sharing.clone(), sector_id, scan, now_ts)
            .map_err(|e| SwarmError::new(SwarmErrorKind::KnowledgePoisoned, e.detail))
    }

    pub fn inherit_on_death(&self, dead_bot_id: &str, successor_bot_id: &str) {
        self.knowledge.inherit_on_death(dead_bot_id, successor_bot_id);
        self.report_death(dead_bot_id);
        self.registry.register(successor_bot_id);
    }

    // -- Hijack leases ------------------------------------------------------

    pub fn assume(&self, bot_id: &str, owner: &str, lease_s: u64) -> Result<HijackLease, SwarmError> {
        if !self.registry.contains(bot_id) {
            return Err(SwarmError::new(SwarmErrorKind::BotNotFound, bot_id));
        }
        self.leases.begin(bot_id, owner, lease_s)
    }

    pub fn hijack_begin(&self, bot_id: &str, owner: &str, lease_s: u64) -> Result<HijackLease, SwarmError> {
        self.assume(bot_id, owner, lease_s)
    }

    pub fn hijack_heartbeat(&self, bot_id: &str, owner: &str) -> Result<HijackLease, SwarmError> {
        self.leases.heartbeat(bot_id, owner)
    }

    pub fn hijack_release(&self, bot_id: &str, owner: &str) -> Result<(), SwarmError> {
        self.leases.release(bot_id, owner)
    }

    /// Validates the lease before the caller performs the actual
    /// read/send against the bot's session (the manager does not own
    /// the transport; it only gates access to it).
    pub fn hijack_authorize(&self, bot_id: &str, owner: &str) -> Result<(), SwarmError> {
        self.leases.check_holder(bot_id, owner)
    }
}

impl Default for SwarmManager {
    fn default() -> Self {
        Self::new(SwarmManagerConfig::default())
    }
}

pub type SharedSwarmManager = Arc<SwarmManager>;

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
