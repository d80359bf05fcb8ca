//! JMAP HTTP client: session discovery and batched method calls.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::{AppConfig, MailConfig};
use crate::error::{Result, TriageError};

pub const CORE_CAPABILITY: &str = "urn:ietf:params:jmap:core";
pub const MAIL_CAPABILITY: &str = "urn:ietf:params:jmap:mail";

const HTTP_TIMEOUT_SECONDS: u64 = 30;

pub struct JmapClient {
    http: reqwest::Client,
    token: String,
    pub(super) api_url: String,
    pub(super) account_id: String,
    pub(super) account_email: Option<String>,
    pub(super) mail: MailConfig,
}

impl JmapClient {
    /// Resolve the session and build a ready client.
    ///
    /// A fresh client is constructed per cycle, so transient session
    /// failures heal on the next cycle.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let token = config
            .fastmail
            .api_token
            .clone()
            .ok_or_else(|| TriageError::Config("Missing Fastmail API token".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| TriageError::MailStore(format!("HTTP client error: {e}")))?;

        let mut client = Self {
            http,
            token,
            api_url: config.fastmail.api_url.clone().unwrap_or_default(),
            account_id: config.fastmail.account_id.clone().unwrap_or_default(),
            account_email: None,
            mail: config.mail.clone(),
        };

        let session = client
            .http_json(reqwest::Method::GET, &config.fastmail.session_url, None)
            .await?;

        if client.api_url.is_empty() {
            client.api_url = session
                .get("apiUrl")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    TriageError::MailStore("No apiUrl found in session response".to_string())
                })?;
        }

        if client.account_id.is_empty() {
            client.account_id = resolve_account_id(&session).ok_or_else(|| {
                TriageError::MailStore("No usable accountId found in session response".to_string())
            })?;
        }

        client.account_email = resolve_account_email(&session, &client.account_id);
        debug!(account_id = %client.account_id, "JMAP session established");

        Ok(client)
    }

    /// POST a batch of method calls and fail on any `error` method response.
    pub async fn call(&self, method_calls: Value) -> Result<Value> {
        let payload = json!({
            "using": [CORE_CAPABILITY, MAIL_CAPABILITY],
            "methodCalls": method_calls,
        });

        let response = self
            .http_json(reqwest::Method::POST, &self.api_url, Some(&payload))
            .await?;

        for entry in method_responses(&response) {
            let (name, result, call_id) = entry;
            if name == "error" {
                let err_type = result
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let description = result
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                return Err(TriageError::MailStore(
                    format!("JMAP error ({call_id}): {err_type} {description}")
                        .trim_end()
                        .to_string(),
                ));
            }
        }

        Ok(response)
    }

    pub(super) fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn http_json(
        &self,
        method: reqwest::Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<Value> {
        if url.is_empty() {
            return Err(TriageError::MailStore("URL is missing".to_string()));
        }

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json");
        if let Some(body) = payload {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TriageError::MailStore(format!("Network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TriageError::MailStore(format!("HTTP {status}: {body}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TriageError::MailStore(format!("Invalid JSON response: {e}")))
    }
}

/// Extract the method result for one call id from a JMAP response.
pub fn get_call<'a>(response: &'a Value, call_id: &str) -> Result<&'a Value> {
    for (name, result, cid) in method_responses(response) {
        if cid != call_id {
            continue;
        }
        if name == "error" {
            let err_type = result
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let description = result
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("");
            return Err(TriageError::MailStore(
                format!("{err_type}: {description}").trim_end().to_string(),
            ));
        }
        return Ok(result);
    }
    Err(TriageError::MailStore(format!(
        "Missing call response for {call_id}"
    )))
}

fn method_responses(response: &Value) -> impl Iterator<Item = (&str, &Value, &str)> {
    response
        .get("methodResponses")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let items = entry.as_array()?;
            let name = items.first()?.as_str()?;
            let result = items.get(1)?;
            let call_id = items.get(2)?.as_str().unwrap_or("");
            Some((name, result, call_id))
        })
}

fn resolve_account_id(session: &Value) -> Option<String> {
    let primary = session
        .get("primaryAccounts")
        .and_then(|p| p.get(MAIL_CAPABILITY))
        .and_then(Value::as_str);
    if let Some(id) = primary {
        return Some(id.to_string());
    }

    session
        .get("accounts")
        .and_then(Value::as_object)
        .and_then(|accounts| accounts.keys().next())
        .map(|k| k.to_string())
}

fn resolve_account_email(session: &Value, account_id: &str) -> Option<String> {
    let account = session.get("accounts").and_then(|a| a.get(account_id))?;

    for key in ["email", "emailAddress", "name"] {
        if let Some(value) = account.get(key).and_then(Value::as_str) {
            let candidate = value.trim().to_lowercase();
            if candidate.contains('@') {
                return Some(candidate);
            }
        }
    }
    None
}
