//! Character lifecycle records and the themed name generator. Names are
//! drawn prefix×middle×suffix with a used-name set guarded by the caller
//! (the Swarm Manager serializes access when multiple characters share
//! a generator).

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use crate::config::{CharacterConfig, NameComplexity};

const PREFIXES: &[&str] = &["Star", "Nova", "Void", "Solar", "Astro", "Quasar", "Nebula", "Pulsar", "Comet", "Orbit"];
const MIDDLES: &[&str] = &["wind", "fire", "shade", "drift", "storm", "spark", "reach", "fall", "gleam", "warp"];
const SUFFIXES: &[&str] = &["runner", "walker", "hawk", "strider", "rider", "seeker", "wraith", "blade", "keeper", "ghost"];

const SHIP_PREFIXES: &[&str] = &["ISS", "TSS", "UST", "HMS", "CSS"];
const SHIP_NAMES: &[&str] = &["Wanderer", "Fortune", "Vanguard", "Horizon", "Meridian", "Crucible", "Tempest", "Aurora"];

/// Deterministic if `name_seed` is set, otherwise OS-entropy seeded.
pub struct NameGenerator {
    rng: StdRng,
    used: HashSet<String>,
}

impl NameGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self { rng, used: HashSet::new() }
    }

    fn raw_name(&mut self, complexity: &NameComplexity) -> String {
        let prefix = PREFIXES.choose(&mut self.rng).copied().unwrap_or("Star");
        match complexity {
            NameComplexity::Simple => prefix.to_string(),
            NameComplexity::Medium => {
                let suffix = SUFFIXES.choose(&mut self.rng).copied().unwrap_or("runner");
                format!("{prefix}{suffix}")
            }
            NameComplexity::Complex => {
                let middle = MIDDLES.choose(&mut self.rng).copied().unwrap_or("wind");
                let suffix = SUFFIXES.choose(&mut self.rng).copied().unwrap_or("runner");
                format!("{prefix}{middle}{suffix}")
            }
            NameComplexity::Numbered => {
                let suffix = SUFFIXES.choose(&mut self.rng).copied().unwrap_or("runner");
                let n: u32 = self.rng.random_range(1..10_000);
                format!("{prefix}{suffix}{n}")
            }
        }
    }

    /// Generates a character name not already present in the used-name
    /// set, marking it used before returning.
    pub fn generate_character_name(&mut self, config: &CharacterConfig) -> String {
        loop {
            let candidate = self.raw_name(&config.name_complexity);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    pub fn generate_ship_name(&mut self, config: &CharacterConfig) -> Option<String> {
        if !config.generate_ship_names {
            return None;
        }
        loop {
            let prefix = SHIP_PREFIXES.choose(&mut self.rng).copied().unwrap_or("ISS");
            let name = SHIP_NAMES.choose(&mut self.rng).copied().unwrap_or("Wanderer");
            let candidate = if config.ship_names_with_numbers {
                let n: u32 = self.rng.random_range(1..1000);
                format!("{prefix} {name} {n}")
            } else {
                format!("{prefix} {name}")
            };
            if self.used.insert(candidate.clone()) {
                return Some(candidate);
            }
        }
    }

    pub fn mark_used(&mut self, name: impl Into<String>) {
        self.used.insert(name.into());
    }
}

#[derive(Debug, Clone, Default)]
pub struct CharacterRecord {
    pub name: String,
    pub ship_name: Option<String>,
    pub credits: i64,
    pub turns_used: u32,
    pub deaths: u32,
    pub sessions_played: u32,
    pub created_ts: u64,
    pub retired: bool,
}

impl CharacterRecord {
    pub fn new(name: impl Into<String>, ship_name: Option<String>, created_ts: u64) -> Self {
        Self { name: name.into(), ship_name, created_ts, ..Default::default() }
    }

    /// Records a death, updating lifetime stats and leaving the retirement
    /// decision to the caller (retire or create a successor).
    pub fn record_death(&mut self, credits_at_death: i64, turns_this_session: u32) {
        self.deaths += 1;
        self.credits = credits_at_death;
        self.turns_used += turns_this_session;
    }

    pub fn retire(&mut self) {
        self.retired = true;
    }
}

#[cfg(test)]
#[path = "character_tests.rs"]
mod tests;
