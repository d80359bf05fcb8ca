use rusqlite::Connection;

use crate::error::Result;

/// Idempotent schema creation for the triage state database.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per message id ever seen; the upsert preserves
        -- first_seen_at on conflict.
        CREATE TABLE IF NOT EXISTS triage_state (
            email_id        TEXT PRIMARY KEY,   -- opaque JMAP message id
            subject         TEXT,
            sender          TEXT,               -- display form
            sender_email    TEXT,               -- lowercased address
            received_at     TEXT,               -- ISO-8601 UTC
            priority        TEXT,               -- 'high' | 'medium' | 'low'
            actionable      INTEGER NOT NULL,
            reason          TEXT,
            summary         TEXT,
            reply_text      TEXT,               -- stored even when no draft was made
            drafted         INTEGER NOT NULL DEFAULT 0,
            draft_id        TEXT,
            status          TEXT NOT NULL,      -- 'triaged' | 'archived' | 'drafted' | 'skipped' | 'error'
            error           TEXT,
            raw_email       TEXT,               -- serialized message payload for debugging
            first_seen_at   TEXT NOT NULL,
            last_seen_at    TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        -- Append-only run log, one row per committed cycle
        CREATE TABLE IF NOT EXISTS triage_runs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            run_at          TEXT NOT NULL,
            mode            TEXT NOT NULL,      -- 'apply' | 'dry-run'
            emails_seen     INTEGER NOT NULL,
            triaged_count   INTEGER NOT NULL,
            drafted_count   INTEGER NOT NULL,
            skipped_count   INTEGER NOT NULL,
            error_count     INTEGER NOT NULL,
            details_json    TEXT                -- full cycle summary
        );

        CREATE TABLE IF NOT EXISTS vip_senders (
            email           TEXT PRIMARY KEY,   -- lowercased address
            added_at        TEXT NOT NULL,
            source          TEXT NOT NULL,      -- 'config' | 'manual' | 'auto_frequency'
            note            TEXT
        );

        CREATE TABLE IF NOT EXISTS draft_blocked_senders (
            email           TEXT PRIMARY KEY,   -- lowercased address
            added_at        TEXT NOT NULL,
            source          TEXT NOT NULL
        );
        ",
    )?;

    Ok(())
}
