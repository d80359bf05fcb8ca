//! Per-message triage state and the append-only run log.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::triage::{MessageStatus, Priority};

use super::StateStore;

/// Snapshot of one handled message, as persisted.
#[derive(Debug, Clone)]
pub struct TriageState {
    pub email_id: String,
    pub subject: String,
    pub sender: String,
    pub sender_email: String,
    pub received_at: String,
    pub priority: Option<Priority>,
    pub actionable: bool,
    pub reason: String,
    pub summary: String,
    pub reply_text: String,
    pub drafted: bool,
    pub draft_id: Option<String>,
    pub status: MessageStatus,
    pub error: String,
    pub raw_email: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub updated_at: String,
}

/// One committed cycle, as recorded in the run log.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_at: String,
    pub apply_mode: bool,
    pub emails_seen: usize,
    pub triaged_count: usize,
    pub drafted_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub details_json: String,
}

fn row_to_state(row: &Row<'_>) -> rusqlite::Result<TriageState> {
    let priority: Option<String> = row.get("priority")?;
    let status: String = row.get("status")?;
    Ok(TriageState {
        email_id: row.get("email_id")?,
        subject: row.get::<_, Option<String>>("subject")?.unwrap_or_default(),
        sender: row.get::<_, Option<String>>("sender")?.unwrap_or_default(),
        sender_email: row
            .get::<_, Option<String>>("sender_email")?
            .unwrap_or_default(),
        received_at: row
            .get::<_, Option<String>>("received_at")?
            .unwrap_or_default(),
        priority: priority.as_deref().and_then(Priority::parse),
        actionable: row.get::<_, i64>("actionable")? != 0,
        reason: row.get::<_, Option<String>>("reason")?.unwrap_or_default(),
        summary: row.get::<_, Option<String>>("summary")?.unwrap_or_default(),
        reply_text: row
            .get::<_, Option<String>>("reply_text")?
            .unwrap_or_default(),
        drafted: row.get::<_, i64>("drafted")? != 0,
        draft_id: row
            .get::<_, Option<String>>("draft_id")?
            .filter(|d| !d.is_empty()),
        status: MessageStatus::parse(&status).unwrap_or(MessageStatus::Error),
        error: row.get::<_, Option<String>>("error")?.unwrap_or_default(),
        raw_email: row
            .get::<_, Option<String>>("raw_email")?
            .unwrap_or_default(),
        first_seen_at: row.get("first_seen_at")?,
        last_seen_at: row.get("last_seen_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl StateStore {
    pub fn get_state(&self, email_id: &str) -> Result<Option<TriageState>> {
        let state = self
            .conn()
            .query_row(
                "SELECT * FROM triage_state WHERE email_id = ?1",
                params![email_id],
                row_to_state,
            )
            .optional()?;
        Ok(state)
    }

    /// Insert or update the full snapshot. `first_seen_at` is preserved for
    /// existing rows.
    pub fn upsert_state(&self, state: &TriageState) -> Result<()> {
        self.conn().execute(
            "INSERT INTO triage_state (
               email_id, subject, sender, sender_email, received_at,
               priority, actionable, reason, summary, reply_text,
               drafted, draft_id, status, error, raw_email,
               first_seen_at, last_seen_at, updated_at
             ) VALUES (
               ?1, ?2, ?3, ?4, ?5,
               ?6, ?7, ?8, ?9, ?10,
               ?11, ?12, ?13, ?14, ?15,
               ?16, ?17, ?18
             )
             ON CONFLICT(email_id) DO UPDATE SET
               subject=excluded.subject,
               sender=excluded.sender,
               sender_email=excluded.sender_email,
               received_at=excluded.received_at,
               priority=excluded.priority,
               actionable=excluded.actionable,
               reason=excluded.reason,
               summary=excluded.summary,
               reply_text=excluded.reply_text,
               drafted=excluded.drafted,
               draft_id=excluded.draft_id,
               status=excluded.status,
               error=excluded.error,
               raw_email=excluded.raw_email,
               last_seen_at=excluded.last_seen_at,
               updated_at=excluded.updated_at",
            params![
                state.email_id,
                state.subject,
                state.sender,
                state.sender_email,
                state.received_at,
                state.priority.map(|p| p.as_str()),
                state.actionable as i64,
                state.reason,
                state.summary,
                state.reply_text,
                state.drafted as i64,
                state.draft_id,
                state.status.as_str(),
                state.error,
                state.raw_email,
                state.first_seen_at,
                state.last_seen_at,
                state.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Refresh the seen timestamps of an existing row without touching the
    /// triage snapshot (the already-drafted skip path).
    pub fn touch_seen(&self, email_id: &str, now: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE triage_state SET last_seen_at = ?1, updated_at = ?1 WHERE email_id = ?2",
            params![now, email_id],
        )?;
        Ok(())
    }

    /// Messages from this sender already stored with high priority; feeds
    /// the VIP auto-promotion rule.
    pub fn count_high_priority_from(&self, sender_email: &str) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM triage_state WHERE sender_email = ?1 AND priority = 'high'",
            params![sender_email],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn record_run(&self, run: &RunRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO triage_runs (
               run_at, mode, emails_seen, triaged_count, drafted_count,
               skipped_count, error_count, details_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.run_at,
                if run.apply_mode { "apply" } else { "dry-run" },
                run.emails_seen as i64,
                run.triaged_count as i64,
                run.drafted_count as i64,
                run.skipped_count as i64,
                run.error_count as i64,
                run.details_json,
            ],
        )?;
        Ok(())
    }
}
