//! HTTP assistant provider against an OpenAI-style Responses API.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use async_trait::async_trait;

use crate::config::{CodexAuth, CodexSettings};
use crate::error::{Result, TriageError};

use super::{parse_json_object, truncate, Assistant, Refinement, TriageRequest};

const MIN_TIMEOUT_SECONDS: u64 = 10;

pub struct HttpAssistant {
    http: reqwest::Client,
    model: String,
    reasoning_effort: Option<String>,
    api_key: String,
    base_url: String,
}

impl HttpAssistant {
    pub fn new(settings: &CodexSettings, timeout_seconds: u64) -> Result<Self> {
        let api_key = match &settings.auth {
            CodexAuth::ApiKey(key) => key.clone(),
            CodexAuth::Subscription => {
                return Err(TriageError::Config(
                    "HTTP assistant requires api_key auth".to_string(),
                ))
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds.max(MIN_TIMEOUT_SECONDS)))
            .build()
            .map_err(|e| TriageError::Llm(format!("HTTP client error: {e}")))?;

        Ok(Self {
            http,
            model: settings.model.clone(),
            reasoning_effort: settings.reasoning_effort.clone(),
            api_key,
            base_url: settings.base_url.clone(),
        })
    }

    async fn post_responses(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/responses", self.base_url);
        debug!(model = %self.model, "Calling assistant API");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| TriageError::Llm(format!("Assistant network error: {e}")))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| TriageError::Llm(format!("Assistant network error: {e}")))?;

        if !status.is_success() {
            return Err(TriageError::Llm(format!(
                "Assistant HTTP {status}: {}",
                truncate(&raw, 500)
            )));
        }

        let parsed: Value = serde_json::from_str(&raw).map_err(|_| {
            TriageError::Llm(format!(
                "Assistant returned invalid JSON: {}",
                truncate(&raw, 500)
            ))
        })?;
        if !parsed.is_object() {
            return Err(TriageError::Llm(
                "Assistant response was not a JSON object".to_string(),
            ));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl Assistant for HttpAssistant {
    async fn triage(&self, request: &TriageRequest) -> Result<Refinement> {
        let input = format!(
            "SYSTEM:\n{}\n\nUSER:\n{}",
            request.system_prompt(),
            serde_json::to_string(&request.user_payload())
                .map_err(|e| TriageError::Llm(e.to_string()))?
        );

        let mut payload = json!({
            "model": self.model,
            "input": input,
        });
        if let Some(effort) = &self.reasoning_effort {
            payload["reasoning"] = json!({"effort": effort});
        }

        let response = self.post_responses(&payload).await?;
        let output_text = extract_output_text(&response);
        if output_text.is_empty() {
            return Err(TriageError::Llm(
                "Assistant returned no output text".to_string(),
            ));
        }

        let parsed = parse_json_object(&output_text)?;
        Refinement::from_value(&parsed, &request.fallback_reply)
    }
}

/// Read the response text: the top-level `output_text` shortcut when
/// present, else the concatenated text items of message-typed outputs.
fn extract_output_text(response: &Value) -> String {
    if let Some(direct) = response.get("output_text").and_then(Value::as_str) {
        let trimmed = direct.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut pieces: Vec<String> = Vec::new();
    let outputs = response
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for item in outputs {
        if item.get("type").and_then(Value::as_str) != Some("message") {
            continue;
        }
        let contents = item
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for content in contents {
            let ctype = content.get("type").and_then(Value::as_str);
            if !matches!(ctype, Some("output_text") | Some("text")) {
                continue;
            }
            if let Some(text) = content.get("text").and_then(Value::as_str) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    pieces.push(trimmed.to_string());
                }
            }
        }
    }
    pieces.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_shortcut_is_preferred() {
        let response = json!({
            "output_text": "  {\"priority\": \"high\"}  ",
            "output": [{"type": "message", "content": [{"type": "text", "text": "ignored"}]}]
        });
        assert_eq!(extract_output_text(&response), "{\"priority\": \"high\"}");
    }

    #[test]
    fn message_content_items_are_concatenated() {
        let response = json!({
            "output": [
                {"type": "reasoning", "content": [{"type": "text", "text": "skip me"}]},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"priority\":"},
                    {"type": "refusal", "refusal": "skip"},
                    {"type": "text", "text": "\"low\"}"}
                ]}
            ]
        });
        assert_eq!(extract_output_text(&response), "{\"priority\":\n\"low\"}");
    }

    #[test]
    fn missing_output_yields_empty_string() {
        assert_eq!(extract_output_text(&json!({})), "");
    }
}
