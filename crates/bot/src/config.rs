//! Hierarchical configuration schema.
//!
//! Loading the document from disk (YAML/TOML/JSON bytes) and CLI argument
//! parsing are external collaborators; this module only owns the parsed
//! shape and the environment-override merge rule, both of which the core
//! consumes directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NameComplexity {
    #[serde(rename = "simple")]
    Simple,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "complex")]
    Complex,
    #[serde(rename = "numbered")]
    Numbered,
}

impl Default for NameComplexity {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrategyKind {
    #[serde(rename = "profitable_pairs")]
    ProfitablePairs,
    #[serde(rename = "opportunistic")]
    Opportunistic,
    #[serde(rename = "twerk_optimized")]
    TwerkOptimized,
    #[serde(rename = "ai_strategy")]
    AiStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KnowledgeSharing {
    #[serde(rename = "shared")]
    Shared,
    #[serde(rename = "independent")]
    Independent,
    #[serde(rename = "inherit_on_death")]
    InheritOnDeath,
}

impl Default for KnowledgeSharing {
    fn default() -> Self {
        Self::Independent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LlmProvider {
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "gemini")]
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContextMode {
    #[serde(rename = "summary")]
    Summary,
    #[serde(rename = "full")]
    Full,
}

impl Default for ContextMode {
    fn default() -> Self {
        Self::Summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 23 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub password: String,
    pub name_complexity: NameComplexity,
    pub generate_ship_names: bool,
    pub ship_names_with_numbers: bool,
    pub name_seed: Option<u64>,
    /// Which game letter to select at the TWGS game-selection menu.
    pub game_selection: String,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            name_complexity: NameComplexity::default(),
            generate_ship_names: true,
            ship_names_with_numbers: false,
            name_seed: None,
            game_selection: "A".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCollapseConfig {
    pub enabled: bool,
    pub window_minutes: u32,
    pub floor_net_worth_per_turn: f64,
}

impl Default for AntiCollapseConfig {
    fn default() -> Self {
        Self { enabled: true, window_minutes: 15, floor_net_worth_per_turn: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeQualityConfig {
    pub min_profit_per_unit: f64,
    pub max_hop_radius: u32,
}

impl Default for TradeQualityConfig {
    fn default() -> Self {
        Self { min_profit_per_unit: 0.0, max_hop_radius: 6 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub strategy: String,
    pub anti_collapse: AntiCollapseConfig,
    pub trade_quality: TradeQualityConfig,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            strategy: "opportunistic".into(),
            anti_collapse: AntiCollapseConfig::default(),
            trade_quality: TradeQualityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub target_credits: Option<u64>,
    pub max_turns_per_session: u32,
    /// Stability window for `is_idle`, shared with the last-N-rows slice
    /// width used by the detector.
    pub stability_window_ms: u64,
    pub detector_rows: usize,
    /// Safe-anchor key sequence for disorientation recovery.
    /// Configured here rather than inside the rule file, for simplicity.
    pub recovery_anchor_sequence: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_credits: None,
            max_turns_per_session: 2_000,
            stability_window_ms: 120,
            detector_rows: 4,
            recovery_anchor_sequence: "Q\r".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiCharacterConfig {
    pub enabled: bool,
    pub max_characters: u32,
    pub knowledge_sharing: KnowledgeSharing,
    /// Whether `inherit_on_death` copies `danger_cooldowns` too. Configurable,
    /// default off.
    pub inherit_danger_cooldowns: bool,
}

impl Default for MultiCharacterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_characters: 1,
            knowledge_sharing: KnowledgeSharing::default(),
            inherit_danger_cooldowns: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    pub retry_backoff_multiplier: f64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3".into(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 1.0,
            retry_backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub ollama: LlmProviderConfig,
    pub openai: LlmProviderConfig,
    pub gemini: LlmProviderConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            ollama: LlmProviderConfig::default(),
            openai: LlmProviderConfig::default(),
            gemini: LlmProviderConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn active_provider(&self) -> &LlmProviderConfig {
        match self.provider.as_str() {
            "openai" => &self.openai,
            "gemini" => &self.gemini,
            _ => &self.ollama,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiStrategyConfig {
    pub enabled: bool,
    pub fallback_strategy: String,
    pub fallback_threshold: u32,
    pub fallback_duration_turns: u32,
    pub context_mode: ContextMode,
    pub sector_radius: u32,
    pub include_history: bool,
    pub max_history_items: u32,
    pub timeout_ms: u64,
}

impl Default for AiStrategyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fallback_strategy: "opportunistic".into(),
            fallback_threshold: 3,
            fallback_duration_turns: 10,
            context_mode: ContextMode::default(),
            sector_radius: 3,
            include_history: true,
            max_history_items: 10,
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub character: CharacterConfig,
    pub trading: TradingConfig,
    pub session: SessionConfig,
    pub multi_character: MultiCharacterConfig,
    pub llm: LlmConfig,
    pub ai_strategy: AiStrategyConfig,
}

impl Config {
    /// Build a `Config` from an already-parsed document. The document's
    /// original syntax (YAML, TOML, JSON) is irrelevant once it reaches
    /// this boundary as a `serde_json::Value`.
    pub fn from_document(doc: Value) -> anyhow::Result<Config> {
        let cfg: Config = serde_json::from_value(doc)?;
        Ok(cfg)
    }

    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Applies `<APP>_<SECTION>__<SUBSECTION>__<KEY>` style overrides onto a
/// parsed document in place, before it is deserialized into `Config`.
///
/// `prefix` is `<APP>_` (e.g. `"TW2002_"`). Each env var whose name starts
/// with the prefix is split on `__` into a path of JSON object keys; the
/// final segment's value replaces whatever was at that path, parsed as
/// JSON first and falling back to a raw string.
pub fn apply_env_overrides(doc: &mut Value, prefix: &str, env: &HashMap<String, String>) {
    if !doc.is_object() {
        *doc = Value::Object(Default::default());
    }
    let mut keys: Vec<_> = env.keys().filter(|k| k.starts_with(prefix)).collect();
    keys.sort();
    for key in keys {
        let value = &env[key];
        let path = &key[prefix.len()..];
        let segments: Vec<String> =
            path.split("__").map(|s| s.to_lowercase()).filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            continue;
        }
        set_path(doc, &segments, parse_override_value(value));
    }
}

fn parse_override_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_path(root: &mut Value, segments: &[String], value: Value) {
    let mut cursor = root;
    for (i, segment) in segments.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = Value::Object(Default::default());
        }
        let Some(map) = cursor.as_object_mut() else { return };
        if i == segments.len() - 1 {
            map.insert(segment.clone(), value);
            return;
        }
        cursor = map.entry(segment.clone()).or_insert_with(|| Value::Object(Default::default()));
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
