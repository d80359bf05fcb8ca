//! LLM assistant capability with two providers.
//!
//! Both providers share one contract: given the message payload and the
//! rule classifier's baseline, return a refined priority, actionability,
//! reason, summary, and reply text. Provider output is parsed tolerantly
//! (strict-JSON prompts notwithstanding) and then validated strictly:
//! an unknown priority is rejected, never coerced.

pub mod http;
pub mod subprocess;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::{resolve_codex_settings, AppConfig, CodexAuth};
use crate::error::{Result, TriageError};
use crate::jmap::types::Email;
use crate::triage::Priority;

/// System prompt shared by both providers.
const SYSTEM_PROMPT: &str = "You are an email triage assistant. \
    Return STRICT JSON only, no markdown, no commentary. \
    Decide priority and actionability, then draft a short professional reply.";

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn triage(&self, request: &TriageRequest) -> Result<Refinement>;
}

/// Message fields forwarded to the assistant.
#[derive(Debug, Clone, Serialize)]
pub struct EmailPayload {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub from_email: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub received_at: String,
    pub preview: String,
    pub body: String,
}

impl EmailPayload {
    /// Build the payload, truncating the body to `max_body_chars` with a
    /// literal `[truncated]` marker when cut.
    pub fn from_email(email: &Email, max_body_chars: usize) -> Self {
        let mut body = email.text_content();
        if body.chars().count() > max_body_chars {
            body = body.chars().take(max_body_chars).collect::<String>() + "\n\n[truncated]";
        }

        Self {
            id: email.id.clone(),
            subject: email.subject_str().to_string(),
            from: email.sender_display(),
            from_email: email
                .sender()
                .and_then(|p| p.email.clone())
                .unwrap_or_default(),
            to: email.to_list().iter().map(|p| p.format()).collect(),
            cc: email.cc_list().iter().map(|p| p.format()).collect(),
            received_at: email
                .received_at
                .clone()
                .or_else(|| email.sent_at.clone())
                .unwrap_or_default(),
            preview: email.preview.clone().unwrap_or_default(),
            body,
        }
    }
}

/// One triage request: the payload plus the rules baseline and the reply to
/// fall back to when the assistant returns no text.
#[derive(Debug, Clone)]
pub struct TriageRequest {
    pub payload: EmailPayload,
    pub rule_priority: Priority,
    pub rule_actionable: bool,
    pub rule_reason: String,
    pub fallback_reply: String,
}

impl TriageRequest {
    /// The user-facing JSON object shared by both providers.
    pub(crate) fn user_payload(&self) -> Value {
        json!({
            "task": "Classify and draft response",
            "rules_baseline": {
                "priority": self.rule_priority,
                "actionable": self.rule_actionable,
                "reason": self.rule_reason,
            },
            "email": self.payload,
            "requirements": {
                "priority_values": ["high", "medium", "low"],
                "must_reply_text": true,
                "reply_style": "concise, professional, no AI-fluff",
            },
            "output_schema": {
                "priority": "high|medium|low",
                "actionable": "boolean",
                "reason": "short explanation",
                "summary": "one-sentence summary",
                "reply_text": "draft reply body text",
            },
            "fallback_reply": self.fallback_reply,
        })
    }

    pub(crate) fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }
}

/// Validated assistant output.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub priority: Priority,
    pub actionable: bool,
    pub reason: String,
    pub summary: String,
    pub reply_text: String,
}

impl Refinement {
    /// Validate a parsed provider response. Priority is strict; actionable
    /// accepts booleans and common truthy strings; text fields fall back to
    /// rule-derived defaults when blank.
    pub fn from_value(parsed: &Value, fallback_reply: &str) -> Result<Self> {
        let raw_priority = parsed
            .get("priority")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let priority = Priority::parse(raw_priority).ok_or_else(|| {
            TriageError::Validation(format!("Invalid priority from assistant: {raw_priority:?}"))
        })?;

        let actionable = match parsed.get("actionable") {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                let text = match other {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                };
                matches!(
                    text.trim().to_lowercase().as_str(),
                    "1" | "true" | "yes" | "y"
                )
            }
            None => false,
        };

        let text_field = |key: &str| {
            parsed
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            priority,
            actionable,
            reason: text_field("reason").unwrap_or_else(|| "Codex triage".to_string()),
            summary: text_field("summary")
                .unwrap_or_else(|| format!("Email triaged by Codex ({priority})")),
            reply_text: text_field("reply_text").unwrap_or_else(|| fallback_reply.to_string()),
        })
    }
}

/// Accept a bare JSON object, or the substring between the first `{` and
/// the last `}` when the model wrapped it in prose.
pub fn parse_json_object(text: &str) -> Result<Value> {
    let text = text.trim();

    if let Ok(parsed) = serde_json::from_str::<Value>(text) {
        if parsed.is_object() {
            return Ok(parsed);
        }
    }

    let start = text.find('{');
    let end = text.rfind('}');
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => {
            return Err(TriageError::Llm(format!(
                "Could not find JSON object in assistant output: {}",
                truncate(text, 300)
            )))
        }
    };

    let snippet = &text[start..=end];
    let parsed: Value = serde_json::from_str(snippet).map_err(|_| {
        TriageError::Llm(format!(
            "Failed to parse JSON from assistant output: {}",
            truncate(snippet, 300)
        ))
    })?;

    if !parsed.is_object() {
        return Err(TriageError::Llm(
            "Parsed assistant output was not a JSON object".to_string(),
        ));
    }
    Ok(parsed)
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Build the configured assistant, or `None` when the assistant is disabled.
///
/// Initialization failures (bad auth config, missing CLI login) degrade to
/// `None` when rule fallback is enabled; otherwise they are fatal.
pub async fn build_assistant(config: &AppConfig) -> Result<Option<Box<dyn Assistant>>> {
    if !config.automation.use_codex {
        return Ok(None);
    }

    let timeout = config.automation.codex_timeout_seconds;
    let built: Result<Box<dyn Assistant>> = match resolve_codex_settings(config) {
        Ok(settings) => match settings.auth {
            CodexAuth::ApiKey(_) => http::HttpAssistant::new(&settings, timeout)
                .map(|a| Box::new(a) as Box<dyn Assistant>),
            CodexAuth::Subscription => subprocess::CliAssistant::new(&settings, timeout)
                .await
                .map(|a| Box::new(a) as Box<dyn Assistant>),
        },
        Err(e) => Err(e),
    };

    match built {
        Ok(assistant) => Ok(Some(assistant)),
        Err(e) if config.automation.codex_fallback_to_rules => {
            warn!(error = %e, "Assistant unavailable, continuing with rule-only triage");
            Ok(None)
        }
        Err(e) => Err(TriageError::Config(format!(
            "Codex initialization failed: {e}"
        ))),
    }
}
