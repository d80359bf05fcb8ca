//! Unified error type for the triage daemon.
//!
//! Variants follow the failure domains of the pipeline: configuration
//! problems are fatal before a cycle starts, storage problems abort the
//! current cycle, mail-store problems are isolated per message, and
//! assistant problems either fall back to rules or abort the cycle
//! depending on configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TriageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Mail store error: {0}")]
    MailStore(String),

    #[error("Assistant error: {0}")]
    Llm(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<rusqlite::Error> for TriageError {
    fn from(e: rusqlite::Error) -> Self {
        TriageError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for TriageError {
    fn from(e: std::io::Error) -> Self {
        TriageError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for TriageError {
    fn from(e: serde_json::Error) -> Self {
        TriageError::Validation(e.to_string())
    }
}

/// Result type alias using TriageError
pub type Result<T> = std::result::Result<T, TriageError>;
