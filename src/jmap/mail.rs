//! Mailbox and message operations on top of the JMAP client, and the
//! [`MailStore`] implementation.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Result, TriageError};

use super::client::{get_call, JmapClient};
use super::types::{Email, EmailAddress, Mailbox};
use super::MailStore;

const EMAIL_PROPERTIES: &[&str] = &[
    "id",
    "subject",
    "from",
    "to",
    "cc",
    "receivedAt",
    "sentAt",
    "preview",
    "textBody",
    "bodyValues",
    "keywords",
    "messageId",
    "references",
    "mailboxIds",
];

const MAX_BODY_VALUE_BYTES: u64 = 120_000;

/// Map common mailbox names to their JMAP role.
pub fn mailbox_role_hint(mailbox_name: &str) -> Option<&'static str> {
    match mailbox_name.trim().to_lowercase().as_str() {
        "inbox" => Some("inbox"),
        "sent" | "sent messages" => Some("sent"),
        "drafts" => Some("drafts"),
        "trash" | "deleted" => Some("trash"),
        "junk" | "spam" => Some("junk"),
        "archive" => Some("archive"),
        _ => None,
    }
}

/// Find a mailbox by role first, then by case-insensitive name.
pub fn find_mailbox<'a>(
    mailboxes: &'a [Mailbox],
    mailbox_name: Option<&str>,
    role: Option<&str>,
) -> Result<&'a Mailbox> {
    if let Some(role) = role {
        let wanted = role.to_lowercase();
        for mailbox in mailboxes {
            if mailbox
                .role
                .as_deref()
                .is_some_and(|r| r.to_lowercase() == wanted)
            {
                return Ok(mailbox);
            }
        }
    }

    if let Some(name) = mailbox_name {
        let wanted = name.trim().to_lowercase();
        for mailbox in mailboxes {
            if mailbox
                .name
                .as_deref()
                .is_some_and(|n| n.trim().to_lowercase() == wanted)
            {
                return Ok(mailbox);
            }
        }
    }

    Err(TriageError::MailStore(format!(
        "Mailbox not found (name={mailbox_name:?}, role={role:?})"
    )))
}

fn ensure_reply_subject(subject: &str) -> String {
    let cleaned = subject.trim();
    if cleaned.to_lowercase().starts_with("re:") {
        cleaned.to_string()
    } else if cleaned.is_empty() {
        "Re:".to_string()
    } else {
        format!("Re: {cleaned}")
    }
}

fn quote_lines(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl JmapClient {
    /// The From address used for created drafts: the configured
    /// `mail.sender_email` or the session account's own address.
    fn resolve_sender_email(&self) -> Option<String> {
        self.mail
            .sender_email
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .or_else(|| self.account_email.clone())
    }

    async fn fetch_mailboxes(&self) -> Result<Vec<Mailbox>> {
        let response = self
            .call(json!([
                [
                    "Mailbox/query",
                    {
                        "accountId": self.account_id(),
                        "sort": [{"property": "name", "isAscending": true}],
                    },
                    "mbq"
                ],
                [
                    "Mailbox/get",
                    {
                        "accountId": self.account_id(),
                        "#ids": {"resultOf": "mbq", "name": "Mailbox/query", "path": "/ids"},
                        "properties": [
                            "id", "name", "role", "parentId", "totalEmails", "unreadEmails"
                        ],
                    },
                    "mbg"
                ]
            ]))
            .await?;

        let mbg = get_call(&response, "mbg")?;
        let list = mbg.get("list").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(list)
            .map_err(|e| TriageError::MailStore(format!("Invalid mailbox list: {e}")))
    }

    async fn create_draft(&self, draft: Value) -> Result<String> {
        let response = self
            .call(json!([
                [
                    "Email/set",
                    {
                        "accountId": self.account_id(),
                        "create": {"draft-1": draft},
                    },
                    "es"
                ]
            ]))
            .await?;

        let es = get_call(&response, "es")?;
        if let Some(failure) = es.get("notCreated").and_then(|n| n.get("draft-1")) {
            let reason = failure
                .get("description")
                .or_else(|| failure.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(TriageError::MailStore(format!(
                "Draft create failed: {reason}"
            )));
        }

        es.get("created")
            .and_then(|c| c.get("draft-1"))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TriageError::MailStore("Draft created but no id returned".to_string()))
    }
}

#[async_trait]
impl MailStore for JmapClient {
    async fn list_mailboxes(&self) -> Result<Vec<Mailbox>> {
        self.fetch_mailboxes().await
    }

    async fn query_unread(&self, mailbox_id: &str, limit: usize) -> Result<Vec<Email>> {
        let response = self
            .call(json!([
                [
                    "Email/query",
                    {
                        "accountId": self.account_id(),
                        "filter": {"inMailbox": mailbox_id, "notKeyword": "$seen"},
                        "sort": [{"property": "receivedAt", "isAscending": false}],
                        "position": 0,
                        "limit": limit.max(1),
                    },
                    "eq"
                ],
                [
                    "Email/get",
                    {
                        "accountId": self.account_id(),
                        "#ids": {"resultOf": "eq", "name": "Email/query", "path": "/ids"},
                        "properties": EMAIL_PROPERTIES,
                        "fetchTextBodyValues": true,
                        "maxBodyValueBytes": MAX_BODY_VALUE_BYTES,
                    },
                    "eg"
                ]
            ]))
            .await?;

        let eg = get_call(&response, "eg")?;
        let list = eg.get("list").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(list)
            .map_err(|e| TriageError::MailStore(format!("Invalid email list: {e}")))
    }

    async fn fetch_email(&self, email_id: &str) -> Result<Email> {
        let response = self
            .call(json!([
                [
                    "Email/get",
                    {
                        "accountId": self.account_id(),
                        "ids": [email_id],
                        "properties": EMAIL_PROPERTIES,
                        "fetchTextBodyValues": true,
                        "maxBodyValueBytes": MAX_BODY_VALUE_BYTES,
                    },
                    "eg"
                ]
            ]))
            .await?;

        let eg = get_call(&response, "eg")?;
        let list = eg.get("list").cloned().unwrap_or_else(|| json!([]));
        let mut emails: Vec<Email> = serde_json::from_value(list)
            .map_err(|e| TriageError::MailStore(format!("Invalid email object: {e}")))?;
        if emails.is_empty() {
            return Err(TriageError::MailStore(format!(
                "Message not found with ID {email_id}"
            )));
        }
        Ok(emails.remove(0))
    }

    async fn create_reply_draft(
        &self,
        original: &Email,
        reply_content: &str,
        reply_all: bool,
    ) -> Result<String> {
        let orig_sender = original
            .sender()
            .cloned()
            .ok_or_else(|| TriageError::MailStore("Original message has no sender".to_string()))?;

        let mut cc_recipients: Vec<EmailAddress> = Vec::new();
        if reply_all {
            let mut seen: Vec<String> = vec![original.sender_email()];
            if let Some(own) = self.resolve_sender_email() {
                seen.push(own);
            }

            for person in original.to_list().iter().chain(original.cc_list()) {
                let addr = person
                    .email
                    .as_deref()
                    .map(|e| e.trim().to_lowercase())
                    .unwrap_or_default();
                if addr.is_empty() || seen.contains(&addr) {
                    continue;
                }
                seen.push(addr);
                cc_recipients.push(person.clone());
            }
        }

        let subject = ensure_reply_subject(original.subject_str());
        let original_date = original
            .received_at
            .as_deref()
            .or(original.sent_at.as_deref())
            .unwrap_or("");
        let quote_header = format!("On {original_date}, {} wrote:", orig_sender.format());
        let full_body = format!(
            "{reply_content}\n\n{quote_header}\n\n{}",
            quote_lines(&original.text_content())
        );

        let in_reply_to: Vec<String> = original
            .message_id
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|m| !m.is_empty())
            .cloned()
            .collect();
        let mut references: Vec<String> = original.references.clone().unwrap_or_default();
        for msgid in &in_reply_to {
            if !references.contains(msgid) {
                references.push(msgid.clone());
            }
        }

        let mailboxes = self.fetch_mailboxes().await?;
        let drafts_name = self.mail.drafts_mailbox.clone();
        let drafts_box = find_mailbox(
            &mailboxes,
            Some(&drafts_name),
            Some(mailbox_role_hint(&drafts_name).unwrap_or("drafts")),
        )?;

        let mut mailbox_ids = serde_json::Map::new();
        mailbox_ids.insert(drafts_box.id.clone(), json!(true));

        let mut draft = json!({
            "mailboxIds": mailbox_ids,
            "keywords": {"$draft": true},
            "to": [orig_sender],
            "subject": subject,
            "textBody": [{"partId": "1", "type": "text/plain"}],
            "bodyValues": {"1": {"value": full_body}},
        });

        if !cc_recipients.is_empty() {
            draft["cc"] = json!(cc_recipients);
        }

        if let Some(sender_email) = self.resolve_sender_email() {
            let sender_name = self
                .mail
                .sender_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty());
            draft["from"] = json!([EmailAddress {
                email: Some(sender_email),
                name: sender_name.map(str::to_string),
            }]);
        }

        if !in_reply_to.is_empty() {
            draft["inReplyTo"] = json!(in_reply_to);
        }
        if !references.is_empty() {
            draft["references"] = json!(references);
        }

        let draft_id = self.create_draft(draft).await?;
        debug!(original = %original.id, draft = %draft_id, "Reply draft created");
        Ok(draft_id)
    }

    async fn move_to_mailbox(
        &self,
        email_id: &str,
        mailbox_name: &str,
        role_hint: &str,
    ) -> Result<()> {
        // Validates existence before the move; a missing message fails here
        // with a clearer error than Email/set would give.
        let _ = self.fetch_email(email_id).await?;

        let mailboxes = self.fetch_mailboxes().await?;
        let target = find_mailbox(
            &mailboxes,
            Some(mailbox_name),
            Some(mailbox_role_hint(mailbox_name).unwrap_or(role_hint)),
        )?;

        let mut target_ids = serde_json::Map::new();
        target_ids.insert(target.id.clone(), json!(true));
        let mut update = serde_json::Map::new();
        update.insert(email_id.to_string(), json!({"mailboxIds": target_ids}));

        let response = self
            .call(json!([
                [
                    "Email/set",
                    {
                        "accountId": self.account_id(),
                        "update": update,
                    },
                    "es"
                ]
            ]))
            .await?;

        let es = get_call(&response, "es")?;
        if let Some(failure) = es.get("notUpdated").and_then(|n| n.get(email_id)) {
            let reason = failure
                .get("description")
                .or_else(|| failure.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(TriageError::MailStore(format!("Move failed: {reason}")));
        }

        Ok(())
    }

    fn account_email(&self) -> Option<String> {
        self.account_email.clone()
    }
}
