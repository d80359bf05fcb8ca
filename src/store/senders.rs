//! VIP and draft-block sender sets.

use rusqlite::params;
use std::collections::HashSet;
use tracing::info;

use crate::address;
use crate::error::Result;

use super::{utc_now_iso, StateStore};

/// How a sender entered the VIP (or draft-block) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VipSource {
    Config,
    Manual,
    AutoFrequency,
}

impl VipSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Manual => "manual",
            Self::AutoFrequency => "auto_frequency",
        }
    }
}

impl StateStore {
    pub fn vip_senders(&self) -> Result<HashSet<String>> {
        self.sender_set("vip_senders")
    }

    pub fn list_vip_senders(&self) -> Result<Vec<String>> {
        self.sender_list("vip_senders")
    }

    /// Add a VIP sender. Returns false (a no-op) when the address is
    /// invalid or already present.
    pub fn add_vip_sender(&self, email: &str, source: VipSource) -> Result<bool> {
        self.add_sender("vip_senders", email, source)
    }

    /// Remove a VIP sender. Returns false when the address was absent.
    pub fn remove_vip_sender(&self, email: &str) -> Result<bool> {
        self.remove_sender("vip_senders", email)
    }

    pub fn is_vip(&self, email: &str) -> Result<bool> {
        self.sender_exists("vip_senders", email)
    }

    /// Insert or refresh an auto-promoted VIP row with its note.
    pub fn upsert_auto_vip(&self, email: &str, note: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO vip_senders (email, added_at, source, note)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(email) DO UPDATE SET
               added_at = excluded.added_at,
               source = excluded.source,
               note = excluded.note",
            params![
                email,
                utc_now_iso(),
                VipSource::AutoFrequency.as_str(),
                note
            ],
        )?;
        Ok(())
    }

    /// Seed the VIP table from `triage.vip_senders`; returns how many rows
    /// were newly added.
    pub fn seed_vip_senders(&self, configured: &[String]) -> Result<u32> {
        let mut added = 0;
        for raw in configured {
            if self.add_vip_sender(raw, VipSource::Config)? {
                added += 1;
            }
        }
        if added > 0 {
            info!(added, "Seeded VIP senders from config");
        }
        Ok(added)
    }

    pub fn draft_blocked_senders(&self) -> Result<HashSet<String>> {
        self.sender_set("draft_blocked_senders")
    }

    pub fn list_draft_blocked_senders(&self) -> Result<Vec<String>> {
        self.sender_list("draft_blocked_senders")
    }

    pub fn add_draft_blocked_sender(&self, email: &str, source: VipSource) -> Result<bool> {
        self.add_sender("draft_blocked_senders", email, source)
    }

    pub fn remove_draft_blocked_sender(&self, email: &str) -> Result<bool> {
        self.remove_sender("draft_blocked_senders", email)
    }

    fn sender_set(&self, table: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT email FROM {table}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut set = HashSet::new();
        for row in rows {
            let email = row?;
            if !email.is_empty() {
                set.insert(email.trim().to_lowercase());
            }
        }
        Ok(set)
    }

    fn sender_list(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT email FROM {table} ORDER BY email"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut list = Vec::new();
        for row in rows {
            list.push(row?);
        }
        Ok(list)
    }

    fn sender_exists(&self, table: &str, email: &str) -> Result<bool> {
        let normalized = address::normalize(email);
        if normalized.is_empty() {
            return Ok(false);
        }
        let count: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE email = ?1"),
            params![normalized],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn add_sender(&self, table: &str, email: &str, source: VipSource) -> Result<bool> {
        let normalized = address::normalize(email);
        if normalized.is_empty() || !normalized.contains('@') {
            return Ok(false);
        }
        if self.sender_exists(table, &normalized)? {
            return Ok(false);
        }

        self.conn().execute(
            &format!("INSERT INTO {table} (email, added_at, source) VALUES (?1, ?2, ?3)"),
            params![normalized, utc_now_iso(), source.as_str()],
        )?;
        Ok(true)
    }

    fn remove_sender(&self, table: &str, email: &str) -> Result<bool> {
        let normalized = address::normalize(email);
        if normalized.is_empty() {
            return Ok(false);
        }
        let removed = self.conn().execute(
            &format!("DELETE FROM {table} WHERE email = ?1"),
            params![normalized],
        )?;
        Ok(removed > 0)
    }
}
