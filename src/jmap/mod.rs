//! Remote mailbox access.
//!
//! The triage core depends only on the [`MailStore`] capability; the JMAP
//! client in this module is its production implementation.

pub mod client;
pub mod mail;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::{Email, Mailbox};

/// Abstract capability for remote mailbox operations.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// All mailboxes of the account.
    async fn list_mailboxes(&self) -> Result<Vec<Mailbox>>;

    /// Unread messages in a mailbox, newest first, bounded by `limit`.
    async fn query_unread(&self, mailbox_id: &str, limit: usize) -> Result<Vec<Email>>;

    /// Fetch a single message by id.
    async fn fetch_email(&self, email_id: &str) -> Result<Email>;

    /// Create a reply draft in the Drafts mailbox; returns the draft id.
    async fn create_reply_draft(
        &self,
        original: &Email,
        reply_content: &str,
        reply_all: bool,
    ) -> Result<String>;

    /// Move a message into the named mailbox (role hint used when the name
    /// does not resolve directly).
    async fn move_to_mailbox(
        &self,
        email_id: &str,
        mailbox_name: &str,
        role_hint: &str,
    ) -> Result<()>;

    /// The account's own address, when the backend knows it. Used as the
    /// fallback draft identity when no sender identities are configured.
    fn account_email(&self) -> Option<String>;
}
