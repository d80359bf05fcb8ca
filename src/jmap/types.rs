//! Wire types for JMAP mail objects.
//!
//! JMAP payloads are open-ended JSON; these structs keep the fields the
//! triage pipeline consumes and ignore the rest. Every field except `id` is
//! optional because `Email/get` only returns requested properties and some
//! headers are legitimately absent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of a `from`/`to`/`cc` header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailAddress {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl EmailAddress {
    /// `Name <email>` when both are present, otherwise whichever exists.
    pub fn format(&self) -> String {
        let name = self.name.as_deref().unwrap_or("").trim();
        let email = self.email.as_deref().unwrap_or("").trim();
        if !name.is_empty() && !email.is_empty() {
            format!("{name} <{email}>")
        } else if !email.is_empty() {
            email.to_string()
        } else {
            name.to_string()
        }
    }
}

/// Reference from `textBody` into `bodyValues`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BodyPart {
    pub part_id: Option<String>,
    #[serde(rename = "type")]
    pub part_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BodyValue {
    pub value: Option<String>,
    pub is_truncated: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    pub subject: Option<String>,
    pub from: Option<Vec<EmailAddress>>,
    pub to: Option<Vec<EmailAddress>>,
    pub cc: Option<Vec<EmailAddress>>,
    pub received_at: Option<String>,
    pub sent_at: Option<String>,
    pub preview: Option<String>,
    pub text_body: Option<Vec<BodyPart>>,
    pub body_values: Option<BTreeMap<String, BodyValue>>,
    pub keywords: Option<BTreeMap<String, bool>>,
    pub message_id: Option<Vec<String>>,
    pub references: Option<Vec<String>>,
    pub mailbox_ids: Option<BTreeMap<String, bool>>,
}

impl Email {
    pub fn sender(&self) -> Option<&EmailAddress> {
        self.from.as_deref().and_then(|list| list.first())
    }

    /// The first `from` address, trimmed and lowercased; empty when absent.
    pub fn sender_email(&self) -> String {
        self.sender()
            .and_then(|p| p.email.as_deref())
            .map(|e| e.trim().to_lowercase())
            .unwrap_or_default()
    }

    pub fn sender_display(&self) -> String {
        self.sender().map(EmailAddress::format).unwrap_or_default()
    }

    pub fn to_list(&self) -> &[EmailAddress] {
        self.to.as_deref().unwrap_or_default()
    }

    pub fn cc_list(&self) -> &[EmailAddress] {
        self.cc.as_deref().unwrap_or_default()
    }

    pub fn subject_str(&self) -> &str {
        self.subject.as_deref().unwrap_or("")
    }

    /// Join the plain-text body parts through `bodyValues`; fall back to the
    /// first body value, then to the preview.
    pub fn text_content(&self) -> String {
        let body_values = self.body_values.as_ref();

        if let (Some(parts), Some(values)) = (self.text_body.as_deref(), body_values) {
            let chunks: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.part_id.as_deref())
                .filter_map(|part_id| values.get(part_id))
                .filter_map(|value| value.value.as_deref())
                .filter(|v| !v.is_empty())
                .collect();
            if !chunks.is_empty() {
                return chunks.join("\n\n").trim().to_string();
            }
        }

        if let Some(values) = body_values {
            if let Some(first) = values.values().next().and_then(|v| v.value.as_deref()) {
                if !first.is_empty() {
                    return first.trim().to_string();
                }
            }
        }

        self.preview.as_deref().unwrap_or("").trim().to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Mailbox {
    pub id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub parent_id: Option<String>,
    pub total_emails: Option<u64>,
    pub unread_emails: Option<u64>,
}
