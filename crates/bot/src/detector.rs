//! Prompt Detector (C4): an ordered regex ruleset evaluated over the last
//! N rows of the screen grid, classifying the current prompt and the
//! input kind it expects.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::screen::RenderedGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    SingleKey,
    MultiKey,
    AnyKey,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    LoginName,
    LoginPass,
    GamePass,
    Pause,
    Confirm,
    Menu,
    Input,
    Unknown,
}

/// On-disk shape of a rule before its regex strings are compiled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRuleSpec {
    pub id: String,
    pub regex: String,
    pub input_kind: InputKind,
    #[serde(default)]
    pub expect_cursor_at_end: Option<bool>,
    #[serde(default)]
    pub negative_regex: Option<String>,
    pub kind: PromptKind,
    #[serde(default)]
    pub llm_hints: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromptRule {
    pub id: String,
    pub regex: Regex,
    pub input_kind: InputKind,
    pub expect_cursor_at_end: Option<bool>,
    pub negative_regex: Option<Regex>,
    pub kind: PromptKind,
    pub llm_hints: Option<String>,
}

impl PromptRule {
    pub fn compile(spec: &PromptRuleSpec) -> Result<Self, regex::Error> {
        Ok(Self {
            id: spec.id.clone(),
            regex: Regex::new(&spec.regex)?,
            input_kind: spec.input_kind,
            expect_cursor_at_end: spec.expect_cursor_at_end,
            negative_regex: spec.negative_regex.as_deref().map(Regex::new).transpose()?,
            kind: spec.kind,
            llm_hints: spec.llm_hints.clone(),
        })
    }

    /// Pagination prompts auto-continue in the orchestrator.
    pub fn is_pagination(&self) -> bool {
        self.input_kind == InputKind::AnyKey || self.id.ends_with(".pause") || self.id.ends_with(".more")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDetection {
    pub prompt_id: String,
    pub input_kind: InputKind,
    pub matched_text: String,
    pub matched_row: u16,
    pub kind: PromptKind,
}

pub struct PromptDetector {
    rules: Vec<PromptRule>,
    /// Last-N-rows slice width used for both the stability window and the
    /// region prompts are matched against.
    rows: usize,
}

impl PromptDetector {
    pub fn new(rules: Vec<PromptRule>, rows: usize) -> Self {
        Self { rules, rows: rows.max(1) }
    }

    pub fn from_specs(specs: &[PromptRuleSpec], rows: usize) -> Result<Self, regex::Error> {
        let rules = specs.iter().map(PromptRule::compile).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules, rows))
    }

    /// Loads an ordered rule array from the JSON rule file format.
    /// Parsing the bytes off disk is the caller's concern; this only
    /// turns an already-read JSON document into a compiled detector.
    pub fn from_json(json: &str, rows: usize) -> anyhow::Result<Self> {
        let specs: Vec<PromptRuleSpec> = serde_json::from_str(json)?;
        Ok(Self::from_specs(&specs, rows)?)
    }

    pub fn rule(&self, id: &str) -> Option<&PromptRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Evaluate the ruleset against `grid`. A rule matching outside the
    /// slice's last row is only honored for non-pagination rules; a
    /// pagination-shaped match must land on the final line, so a stale
    /// match inside ANSI art above it is ignored (boundary behavior).
    pub fn detect(&self, grid: &RenderedGrid, cursor_at_end: bool) -> Option<PromptDetection> {
        let start = grid.lines.len().saturating_sub(self.rows);
        let slice = &grid.lines[start..];
        let joined = slice.join("\n");

        for rule in &self.rules {
            let Some(m) = rule.regex.find(&joined) else { continue };

            if let Some(neg) = &rule.negative_regex {
                if neg.is_match(&joined) {
                    continue;
                }
            }
            if let Some(expected) = rule.expect_cursor_at_end {
                if expected != cursor_at_end {
                    continue;
                }
            }

            let matched_row_in_slice = joined[..m.start()].matches('\n').count();
            let absolute_row = (start + matched_row_in_slice) as u16;

            if rule.is_pagination() {
                let last_row = grid.lines.len().saturating_sub(1) as u16;
                if absolute_row != last_row {
                    continue;
                }
            }

            return Some(PromptDetection {
                prompt_id: rule.id.clone(),
                input_kind: rule.input_kind,
                matched_text: m.as_str().to_string(),
                matched_row: absolute_row,
                kind: rule.kind,
            });
        }
        None
    }
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod tests;
