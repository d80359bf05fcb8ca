//! Subprocess assistant provider driving the local `codex` CLI.
//!
//! Runs `codex exec` in ephemeral read-only mode with a strict output
//! schema, piping the prompt on stdin and reading the structured reply from
//! a scratch file (stdout as fallback). Requires an existing subscription
//! login; the login check runs once at construction.

use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use async_trait::async_trait;

use crate::config::CodexSettings;
use crate::error::{Result, TriageError};

use super::{parse_json_object, Assistant, Refinement, TriageRequest};

const MIN_TIMEOUT_SECONDS: u64 = 20;
const LOGIN_CHECK_TIMEOUT: Duration = Duration::from_secs(15);

pub struct CliAssistant {
    model: String,
    reasoning_effort: Option<String>,
    exec_timeout: Duration,
}

impl CliAssistant {
    pub async fn new(settings: &CodexSettings, timeout_seconds: u64) -> Result<Self> {
        ensure_logged_in().await?;
        Ok(Self {
            model: settings.model.clone(),
            reasoning_effort: settings.reasoning_effort.clone(),
            exec_timeout: Duration::from_secs(timeout_seconds.max(MIN_TIMEOUT_SECONDS)),
        })
    }
}

async fn ensure_logged_in() -> Result<()> {
    let check = Command::new("codex")
        .args(["login", "status"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = match timeout(LOGIN_CHECK_TIMEOUT, check).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(TriageError::Llm(format!(
                "`codex` CLI not found in PATH or not runnable ({e}). \
                 Install Codex CLI or use api_key auth mode."
            )))
        }
        Err(_) => {
            return Err(TriageError::Llm(
                "Unable to check Codex login status: timed out".to_string(),
            ))
        }
    };

    let status_text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    if !output.status.success() || !status_text.to_lowercase().contains("logged in") {
        return Err(TriageError::Llm(
            "Codex subscription login not found. Run `codex login` (ChatGPT sign-in) and retry."
                .to_string(),
        ));
    }
    Ok(())
}

/// Output schema handed to `--output-schema`; priority is enum-restricted
/// and all five fields are required.
fn output_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["priority", "actionable", "reason", "summary", "reply_text"],
        "properties": {
            "priority": {"type": "string", "enum": ["high", "medium", "low"]},
            "actionable": {"type": "boolean"},
            "reason": {"type": "string"},
            "summary": {"type": "string"},
            "reply_text": {"type": "string"},
        },
        "additionalProperties": false,
    })
}

#[async_trait]
impl Assistant for CliAssistant {
    async fn triage(&self, request: &TriageRequest) -> Result<Refinement> {
        let prompt = format!(
            "You are an email triage assistant. \
             Return STRICT JSON matching the schema, no markdown, no extra text.\n\n{}",
            serde_json::to_string(&request.user_payload())
                .map_err(|e| TriageError::Llm(e.to_string()))?
        );

        let scratch = tempfile::Builder::new()
            .prefix("codex_triage_")
            .tempdir()
            .map_err(|e| TriageError::Llm(format!("Could not create scratch dir: {e}")))?;
        let schema_path = scratch.path().join("schema.json");
        let out_path = scratch.path().join("response.txt");
        std::fs::write(&schema_path, output_schema().to_string())
            .map_err(|e| TriageError::Llm(format!("Could not write schema file: {e}")))?;

        let mut cmd = Command::new("codex");
        cmd.arg("exec")
            .arg("--ephemeral")
            .arg("--skip-git-repo-check")
            .args(["--sandbox", "read-only"])
            .args(["--model", &self.model])
            .args(["--color", "never"])
            .arg("--output-schema")
            .arg(&schema_path)
            .arg("-o")
            .arg(&out_path);
        if let Some(effort) = &self.reasoning_effort {
            cmd.arg("-c").arg(format!("reasoning.effort={}", json!(effort)));
        }
        cmd.arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(model = %self.model, "Invoking codex CLI");
        let mut child = cmd
            .spawn()
            .map_err(|e| TriageError::Llm(format!("Failed to spawn codex CLI: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| TriageError::Llm(format!("Failed to write codex prompt: {e}")))?;
        }

        let output = match timeout(self.exec_timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| TriageError::Llm(format!("Codex CLI failed to run: {e}")))?
            }
            Err(_) => {
                return Err(TriageError::Llm(format!(
                    "Codex CLI timed out after {}s",
                    self.exec_timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TriageError::Llm(format!(
                "Codex CLI failed (status {}). stdout={:?} stderr={:?}",
                output.status,
                tail(&stdout, 500),
                tail(&stderr, 500)
            )));
        }

        let mut output_text = std::fs::read_to_string(&out_path)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if output_text.is_empty() {
            output_text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        if output_text.is_empty() {
            return Err(TriageError::Llm(
                "Codex CLI returned empty response".to_string(),
            ));
        }

        let parsed = parse_json_object(&output_text)?;
        Refinement::from_value(&parsed, &request.fallback_reply)
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        text.to_string()
    } else {
        text.chars().skip(count - max_chars).collect()
    }
}
