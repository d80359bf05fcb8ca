//! Embedded relational persistence for triage state.
//!
//! The store holds a single exclusive `Connection`: the daemon is the only
//! writer and a cycle's writes happen inside one transaction, committed
//! after the run-log row or rolled back on any uncaught cycle error.

mod schema;
mod senders;
mod state;

pub use senders::VipSource;
pub use state::{RunRecord, TriageState};

use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// and running idempotent schema creation.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::initialize_schema(&conn)?;
        debug!(path = %path.display(), "State store opened");

        Ok(Self { conn })
    }

    /// Start the per-cycle transaction.
    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Commit the per-cycle transaction.
    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Best-effort rollback; returns false when nothing could be rolled
    /// back (e.g. no transaction was active).
    pub fn rollback(&self) -> bool {
        self.conn.execute_batch("ROLLBACK").is_ok()
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Current UTC time as second-precision ISO-8601 with a trailing `Z`.
pub fn utc_now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
pub(crate) fn open_temp() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let store = StateStore::open(&dir.path().join("triage.db")).expect("open store");
    (dir, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b").join("triage.db");
        let store = StateStore::open(&nested).unwrap();
        assert!(nested.exists());
        drop(store);

        // Reopening runs schema creation again without error.
        StateStore::open(&nested).unwrap();
    }

    #[test]
    fn rollback_without_transaction_reports_false() {
        let (_dir, store) = open_temp();
        assert!(!store.rollback());

        store.begin().unwrap();
        assert!(store.rollback());
    }

    #[test]
    fn timestamps_are_second_precision_utc() {
        let now = utc_now_iso();
        assert!(now.ends_with('Z'));
        assert_eq!(now.len(), "2024-01-01T00:00:00Z".len());
    }
}
