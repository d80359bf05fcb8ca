//! Configuration loading and normalization.
//!
//! Config files are YAML or JSON, searched in this order: an explicit
//! `--config` path, `$EMAIL_TRIAGE_CONFIG`, then the default locations
//! under `~/.config/email-triage/` and `~/.config/email-manager/`.
//! Every section tolerates being absent; defaults match the documented
//! behavior of the daemon.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, TriageError};
use crate::triage::Priority;

pub const DEFAULT_STATE_DB: &str = "~/.config/email-triage/triage.db";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fastmail: FastmailConfig,
    pub mail: MailConfig,
    pub automation: AutomationConfig,
    pub ai: AiConfig,
    pub triage: TriageConfig,
    pub drafting: DraftingConfig,
}

/// JMAP endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastmailConfig {
    /// Bearer token for the JMAP API (or `FASTMAIL_API_TOKEN` in the environment)
    pub api_token: Option<String>,
    pub session_url: String,
    /// Skip session discovery of the API URL when set
    pub api_url: Option<String>,
    /// Skip session discovery of the account id when set
    pub account_id: Option<String>,
}

impl Default for FastmailConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            session_url: "https://api.fastmail.com/jmap/session".to_string(),
            api_url: None,
            account_id: None,
        }
    }
}

/// Mailbox names and the operator's sending identities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub account: String,
    pub mailbox: String,
    pub sent_mailbox: String,
    pub drafts_mailbox: String,
    pub trash_mailbox: String,
    pub archive_mailbox: String,
    /// Addresses that count as "me" (string with separators, or a list)
    pub sender_emails: Option<OneOrMany>,
    /// From address for created drafts
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            account: "Fastmail".to_string(),
            mailbox: "INBOX".to_string(),
            sent_mailbox: "Sent".to_string(),
            drafts_mailbox: "Drafts".to_string(),
            trash_mailbox: "Trash".to_string(),
            archive_mailbox: "Archive".to_string(),
            sender_emails: None,
            sender_email: None,
            sender_name: None,
        }
    }
}

/// A config value that may be a single string or a list of strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn values(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(s) => vec![s.as_str()],
            OneOrMany::Many(v) => v.iter().map(|s| s.as_str()).collect(),
        }
    }
}

/// Cycle behavior knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub max_emails_per_cycle: usize,
    pub auto_draft: bool,
    pub reply_all: bool,
    pub draft_actionable_only: bool,
    pub min_priority_for_draft: Priority,
    pub auto_archive_low_priority: bool,
    /// When present, overrides `auto_archive_low_priority`; an explicit
    /// empty list means "never archive".
    pub auto_archive_priorities: Option<Vec<String>>,
    pub loop_interval_seconds: u64,
    pub state_db: String,
    pub use_codex: bool,
    pub codex_timeout_seconds: u64,
    pub codex_fallback_to_rules: bool,
    pub codex_max_body_chars: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_emails_per_cycle: 20,
            auto_draft: true,
            reply_all: true,
            draft_actionable_only: true,
            min_priority_for_draft: Priority::High,
            auto_archive_low_priority: true,
            auto_archive_priorities: None,
            loop_interval_seconds: 900,
            state_db: DEFAULT_STATE_DB.to_string(),
            use_codex: true,
            codex_timeout_seconds: 60,
            codex_fallback_to_rules: true,
            codex_max_body_chars: 4000,
        }
    }
}

impl AutomationConfig {
    /// Priorities eligible for auto-archive, sanitized to known values.
    pub fn archive_priorities(&self) -> HashSet<Priority> {
        match &self.auto_archive_priorities {
            Some(values) => values
                .iter()
                .filter_map(|v| Priority::parse(v.trim()))
                .collect(),
            None if self.auto_archive_low_priority => {
                [Priority::Low, Priority::Medium].into_iter().collect()
            }
            None => HashSet::new(),
        }
    }

    pub fn state_db_path(&self) -> PathBuf {
        expand_tilde(&self.state_db)
    }
}

/// LLM assistant settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub backend: String,
    pub codex: CodexConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            backend: "codex".to_string(),
            codex: CodexConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodexConfig {
    pub model: String,
    #[serde(alias = "reasoning")]
    pub reasoning_effort: Option<String>,
    /// `subscription`, `api_key`, or `auto`
    pub auth_mode: String,
    pub api_key: Option<String>,
    /// Environment variable consulted for the key (default `OPENAI_API_KEY`)
    pub api_key_env: Option<String>,
    pub base_url: String,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-codex".to_string(),
            reasoning_effort: None,
            auth_mode: "subscription".to_string(),
            api_key: None,
            api_key_env: None,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Classifier inputs and VIP policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub urgent_keywords: Vec<String>,
    /// Seeded into the VIP table on startup
    pub vip_senders: Vec<String>,
    /// Auto-promote a sender to VIP after this many high-priority messages
    /// (0 disables promotion)
    pub vip_frequency_threshold: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftingConfig {
    pub signature: Option<String>,
}

impl DraftingConfig {
    pub fn signature_text(&self) -> Option<&str> {
        self.signature
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Resolved assistant settings after auth-mode normalization
#[derive(Debug, Clone)]
pub struct CodexSettings {
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub base_url: String,
    pub auth: CodexAuth,
}

#[derive(Debug, Clone)]
pub enum CodexAuth {
    ApiKey(String),
    Subscription,
}

/// Validate `ai.*` and resolve the effective auth mode.
///
/// `auto` becomes `api_key` when a key is available from config or the
/// environment, otherwise `subscription`.
pub fn resolve_codex_settings(config: &AppConfig) -> Result<CodexSettings> {
    let backend = config.ai.backend.trim().to_lowercase();
    if backend != "codex" {
        return Err(TriageError::Config(format!(
            "Unsupported ai.backend '{backend}'. This pipeline is Codex-only; set ai.backend: codex."
        )));
    }

    let codex = &config.ai.codex;
    let auth_mode = codex.auth_mode.trim().to_lowercase();
    if !matches!(auth_mode.as_str(), "subscription" | "api_key" | "auto") {
        return Err(TriageError::Config(
            "Invalid ai.codex.auth_mode. Use one of: subscription, api_key, auto.".to_string(),
        ));
    }

    let key_env = codex.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
    let api_key = codex
        .api_key
        .clone()
        .or_else(|| env_nonempty(key_env))
        .or_else(|| env_nonempty("OPENAI_API_KEY"))
        .or_else(|| env_nonempty("CODEX_API_KEY"));

    let resolved_mode = if auth_mode == "auto" {
        if api_key.is_some() {
            "api_key"
        } else {
            "subscription"
        }
    } else {
        auth_mode.as_str()
    };

    let auth = if resolved_mode == "api_key" {
        let key = api_key.ok_or_else(|| {
            TriageError::Config(
                "Missing Codex API key. Set ai.codex.api_key or OPENAI_API_KEY (or CODEX_API_KEY)."
                    .to_string(),
            )
        })?;
        CodexAuth::ApiKey(key)
    } else {
        CodexAuth::Subscription
    };

    let reasoning_effort = codex
        .reasoning_effort
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    Ok(CodexSettings {
        model: codex.model.clone(),
        reasoning_effort,
        base_url: codex.base_url.trim_end_matches('/').to_string(),
        auth,
    })
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(env_path) = env_nonempty("EMAIL_TRIAGE_CONFIG") {
        paths.push(expand_tilde(&env_path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        for app in ["email-triage", "email-manager"] {
            for name in ["config.yaml", "config.yml", "config.json"] {
                paths.push(config_dir.join(app).join(name));
            }
        }
    }

    paths
}

/// Load configuration from an explicit path or the default search order.
///
/// Returns the normalized config and the path it came from. Missing config
/// is fatal; the token requirement is enforced here so every later stage can
/// assume `fastmail.api_token` is set.
pub fn load_config(explicit: Option<&Path>) -> Result<(AppConfig, PathBuf)> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(default_config_paths());

    for candidate in &candidates {
        if !candidate.exists() {
            continue;
        }
        info!(path = %candidate.display(), "Loading configuration");
        let config = parse_config_file(candidate)?;
        let config = normalize_config(config)?;
        return Ok((config, candidate.clone()));
    }

    let searched = candidates
        .iter()
        .map(|p| format!("- {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(TriageError::Config(format!(
        "Config file not found. Searched:\n{searched}\nSet EMAIL_TRIAGE_CONFIG or pass --config."
    )))
}

fn parse_config_file(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .map_err(|e| TriageError::Config(format!("Failed to read config: {e}")))?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();

    if name.ends_with(".json") {
        serde_json::from_str(&raw)
            .map_err(|e| TriageError::Config(format!("Failed to parse config: {e}")))
    } else if name.ends_with(".yml") || name.ends_with(".yaml") {
        serde_yaml::from_str(&raw)
            .map_err(|e| TriageError::Config(format!("Failed to parse config: {e}")))
    } else {
        Err(TriageError::Config(format!(
            "Unsupported config format: {}",
            path.display()
        )))
    }
}

fn normalize_config(mut config: AppConfig) -> Result<AppConfig> {
    let token = config
        .fastmail
        .api_token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| env_nonempty("FASTMAIL_API_TOKEN"));

    match token {
        Some(token) => config.fastmail.api_token = Some(token),
        None => {
            return Err(TriageError::Config(
                "Missing Fastmail API token. Set fastmail.api_token in config \
                 or FASTMAIL_API_TOKEN in environment."
                    .to_string(),
            ))
        }
    }

    Ok(config)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
