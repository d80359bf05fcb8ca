//! Triage domain types shared by the classifier, policy engine, and cycle.

pub mod classifier;
pub mod composer;
pub mod cycle;
pub mod policy;

use serde::{Deserialize, Serialize};

/// Message priority, totally ordered `low < medium < high`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Strict parse; anything outside the three known values is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of handling one message within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Triaged,
    Archived,
    Drafted,
    Skipped,
    Error,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triaged => "triaged",
            Self::Archived => "archived",
            Self::Drafted => "drafted",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "triaged" => Some(Self::Triaged),
            "archived" => Some(Self::Archived),
            "drafted" => Some(Self::Drafted),
            "skipped" => Some(Self::Skipped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Which stage produced the final classification for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Codex,
    Rules,
    RulesFallback,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Rules => "rules",
            Self::RulesFallback => "rules_fallback",
        }
    }
}

/// Rule-classifier output for one message.
#[derive(Debug, Clone)]
pub struct RuleVerdict {
    pub priority: Priority,
    pub actionable: bool,
    pub reason: String,
    pub summary: String,
}
