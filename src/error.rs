//! Error taxonomy shared by the storage adapter, datastore service, profile
//! manager and sync engine (spec §7).
//!
//! `ErrorKind` is the coarse classification the sync engine uses to decide
//! whether to keep going (per-item `Conflict`, retryable `Transport`) or
//! abort the current phase (`Version`, `Auth`). `PeekError` carries the
//! structured detail; `kind()` recovers the classification without
//! matching on the full variant shape.

use thiserror::Error;

/// Coarse error classification (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Storage,
    Conflict,
    Transport,
    Version,
    Validation,
    NotFound,
    Auth,
}

#[derive(Debug, Error)]
pub enum PeekError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("unique constraint violated on {collection}.{field}")]
    Conflict { collection: String, field: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error(
        "server/client version mismatch: client datastore version {client}, server {server}"
    )]
    Version { client: String, server: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PeekError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PeekError::Storage(_) | PeekError::Sqlite(_) => ErrorKind::Storage,
            PeekError::Schema(_) => ErrorKind::Storage,
            PeekError::Conflict { .. } => ErrorKind::Conflict,
            PeekError::Transport(_) => ErrorKind::Transport,
            PeekError::Version { .. } => ErrorKind::Version,
            PeekError::Validation(_) | PeekError::Json(_) => ErrorKind::Validation,
            PeekError::NotFound { .. } => ErrorKind::NotFound,
            PeekError::Auth(_) => ErrorKind::Auth,
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PeekError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PeekError::Validation(msg.into())
    }
}

/// Classify a raw `rusqlite::Error` the way the storage adapter contract
/// requires: unique-constraint violations become `Conflict`, everything
/// else is `Storage` (spec §4.1 Failure semantics).
pub fn classify_sqlite_error(
    err: rusqlite::Error,
    collection: &str,
    field: &str,
) -> PeekError {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if e.code == ErrorCode::ConstraintViolation {
            return PeekError::Conflict {
                collection: collection.to_string(),
                field: field.to_string(),
            };
        }
    }
    PeekError::Sqlite(err)
}

pub type Result<T> = std::result::Result<T, PeekError>;
