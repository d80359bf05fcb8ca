//! Deterministic rule-based priority and actionability classification.
//!
//! Signals are evaluated against the lowercased `subject\nbody` text and the
//! sender/recipient addresses. VIP senders, identity-targeted messages, and
//! urgent-keyword hits force `high` priority even when low-signal indicators
//! are present; actionable-but-not-bulk messages land at `medium`.

use regex::Regex;
use std::collections::HashSet;

use crate::address;
use crate::config::AppConfig;
use crate::jmap::types::Email;

use super::{Priority, RuleVerdict};

const ACTION_PATTERNS: &[&str] = &[
    r"\bplease\b",
    r"\bcan you\b",
    r"\bcould you\b",
    r"\bwould you\b",
    r"\bneed you\b",
    r"\baction required\b",
    r"\blet me know\b",
    r"\bfollow up\b",
    r"\bdeadline\b",
    r"\basap\b",
    r"\beod\b",
];

const LOW_SIGNAL_PATTERNS: &[&str] = &[
    r"\bnewsletter\b",
    r"\bdigest\b",
    r"\bnotification\b",
    r"\bpromo\b",
    r"\bmarketing\b",
];

pub struct RuleClassifier {
    urgent_keywords: Vec<String>,
    sender_identities: HashSet<String>,
    action_patterns: Vec<Regex>,
    low_signal_patterns: Vec<Regex>,
}

impl RuleClassifier {
    /// Bundle keyword tables and identities at construction; the pattern
    /// sets are fixed, the keywords come from `triage.urgent_keywords`.
    pub fn new(config: &AppConfig) -> Self {
        let urgent_keywords = config
            .triage
            .urgent_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static classifier pattern"))
                .collect()
        };

        Self {
            urgent_keywords,
            sender_identities: address::sender_identities(&config.mail),
            action_patterns: compile(ACTION_PATTERNS),
            low_signal_patterns: compile(LOW_SIGNAL_PATTERNS),
        }
    }

    pub fn classify(&self, email: &Email, vip_senders: &HashSet<String>) -> RuleVerdict {
        let sender_email = email.sender_email();
        let sender_display = email.sender_display();
        let subject = email.subject_str();
        let combined = format!("{subject}\n{}", email.text_content()).to_lowercase();

        let mut reasons: Vec<String> = Vec::new();

        let is_vip = !sender_email.is_empty() && vip_senders.contains(&sender_email);
        if is_vip {
            reasons.push("VIP sender".to_string());
        }

        let targets_identity = address::targets_identity(email, &self.sender_identities, true);
        if targets_identity {
            reasons.push("sent to configured sender address".to_string());
        }

        let keyword_hits: Vec<&str> = self
            .urgent_keywords
            .iter()
            .filter(|kw| combined.contains(kw.as_str()))
            .map(|kw| kw.as_str())
            .collect();
        if !keyword_hits.is_empty() {
            let shown: Vec<&str> = keyword_hits.iter().take(3).copied().collect();
            reasons.push(format!("urgent keywords: {}", shown.join(", ")));
        }

        let actionable = combined.contains('?')
            || self.action_patterns.iter().any(|p| p.is_match(&combined));
        if actionable {
            reasons.push("contains request/question language".to_string());
        }

        let low_signal_sender = !sender_email.is_empty()
            && (sender_email.contains("noreply")
                || sender_email.contains("no-reply")
                || sender_email.contains("notification"));
        let low_signal =
            low_signal_sender || self.low_signal_patterns.iter().any(|p| p.is_match(&combined));
        if low_signal {
            reasons.push("low-signal/newsletter indicators".to_string());
        }

        let priority = if is_vip || !keyword_hits.is_empty() || targets_identity {
            Priority::High
        } else if actionable && !low_signal {
            Priority::Medium
        } else {
            Priority::Low
        };

        let summary = format!(
            "From {} about '{}'",
            some_or(&sender_display, some_or(&sender_email, "unknown sender")),
            some_or(subject, "(no subject)"),
        );

        let reason = if reasons.is_empty() {
            "default low-priority classification".to_string()
        } else {
            dedupe_in_order(reasons).join("; ")
        };

        RuleVerdict {
            priority,
            actionable,
            reason,
            summary,
        }
    }
}

fn some_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn dedupe_in_order(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
