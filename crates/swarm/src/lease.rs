//! Hijack leases: one exclusive operator lease per bot
//! at a time. `assume` grants a fresh lease outright; `begin` is the same
//! grant spelled out with an explicit owner and duration; `heartbeat`
//! extends it up to a configured ceiling; `release` and expiry both free
//! the bot for a new `begin`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{SwarmError, SwarmErrorKind};

/// Wall-clock source for lease expiry, injectable so tests can advance
/// time without real sleeps.
pub type ClockFn = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn system_clock() -> ClockFn {
    Arc::new(crate::clock::epoch_ms)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HijackLease {
    pub bot_id: String,
    pub owner: String,
    pub granted_at_ms: u64,
    pub expires_at_ms: u64,
    pub lease_s: u64,
}

impl HijackLease {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Per-bot exclusive lease table, serialized behind one lock: the
/// manager is the only process-wide mutable handle for hijack access,
/// besides the knowledge broker.
pub struct LeaseManager {
    leases: Mutex<HashMap<String, HijackLease>>,
    ceiling_s: u64,
    clock: ClockFn,
}

impl LeaseManager {
    pub fn new(ceiling_s: u64, clock: ClockFn) -> Self {
        Self { leases: Mutex::new(HashMap::new()), ceiling_s, clock }
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Drop an expired lease if present, returning whether the slot was
    /// free (either never held or just auto-released).
    fn evict_if_expired(&self, leases: &mut HashMap<String, HijackLease>, bot_id: &str) -> bool {
        match leases.get(bot_id) {
            Some(lease) if lease.is_expired(self.now()) => {
                leases.remove(bot_id);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// `assume`/`begin`: grant a fresh lease if the bot has no unexpired
    /// holder. Rejects with `lease_denied` if one is already held.
    pub fn begin(&self, bot_id: &str, owner: &str, lease_s: u64) -> Result<HijackLease, SwarmError> {
        let mut leases = self.leases.lock();
        if !self.evict_if_expired(&mut leases, bot_id) {
            return Err(SwarmError::new(
                SwarmErrorKind::LeaseDenied,
                format!("bot {bot_id} already has an active hijack lease"),
            ));
        }
        let now = self.now();
        let lease = HijackLease {
            bot_id: bot_id.to_owned(),
            owner: owner.to_owned(),
            granted_at_ms: now,
            expires_at_ms: now + lease_s.min(self.ceiling_s) * 1000,
            lease_s: lease_s.min(self.ceiling_s),
        };
        leases.insert(bot_id.to_owned(), lease.clone());
        Ok(lease)
    }

    /// Validate that `owner` currently holds an unexpired lease on
    /// `bot_id`, as required before `read` or `send` proceed.
    pub fn check_holder(&self, bot_id: &str, owner: &str) -> Result<(), SwarmError> {
        let mut leases = self.leases.lock();
        if self.evict_if_expired(&mut leases, bot_id) {
            return Err(SwarmError::new(SwarmErrorKind::LeaseExpired, format!("no active lease for bot {bot_id}")));
        }
        let lease = leases.get(bot_id).expect("evict_if_expired returned false only when a lease is present");
        if lease.owner != owner {
            return Err(SwarmError::new(SwarmErrorKind::LeaseDenied, format!("bot {bot_id} is leased to another owner")));
        }
        Ok(())
    }

    /// Extend an existing lease by `lease_s`, capped at the ceiling from
    /// the original grant time (not from now), so heartbeats cannot
    /// perpetually push the expiry further than the configured maximum
    /// single-grant duration past issuance.
    pub fn heartbeat(&self, bot_id: &str, owner: &str) -> Result<HijackLease, SwarmError> {
        let mut leases = self.leases.lock();
        if self.evict_if_expired(&mut leases, bot_id) {
            return Err(SwarmError::new(SwarmErrorKind::LeaseExpired, format!("no active lease for bot {bot_id}")));
        }
        let lease = leases.get_mut(bot_id).expect("evict_if_expired returned false only when a lease is present");
        if lease.owner != owner {
            return Err(SwarmError::new(SwarmErrorKind::LeaseDenied, format!("bot {bot_id} is leased to another owner")));
        }
        let now = self.now();
        let ceiling_ms = lease.granted_at_ms + self.ceiling_s * 1000;
        lease.expires_at_ms = (now + lease.lease_s * 1000).min(ceiling_ms);
        Ok(lease.clone())
    }

    pub fn release(&self, bot_id: &str, owner: &str) -> Result<(), SwarmError> {
        let mut leases = self.leases.lock();
        match leases.get(bot_id) {
            Some(lease) if lease.owner == owner => {
                leases.remove(bot_id);
                Ok(())
            }
            Some(_) => Err(SwarmError::new(SwarmErrorKind::LeaseDenied, format!("bot {bot_id} is leased to another owner"))),
            None => Ok(()),
        }
    }

    pub fn current(&self, bot_id: &str) -> Option<HijackLease> {
        let mut leases = self.leases.lock();
        if self.evict_if_expired(&mut leases, bot_id) {
            None
        } else {
            leases.get(bot_id).cloned()
        }
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
