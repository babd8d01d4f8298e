//! Peek: a multi-profile, tag-indexed personal datastore with
//! bidirectional HTTP sync (spec §1 Overview).
//!
//! Layout: [`types`] is the shared data model; [`storage`] is the
//! adapter trait and its SQLite implementation; [`schema`] owns DDL,
//! migrations and the legacy TinyBase import; [`datastore`] is the
//! public CRUD/tag/frecency surface; [`profile`] owns `profiles.db` and
//! on-disk layout; [`sync`] is the pull/push engine against a
//! caller-supplied transport.

pub mod config;
pub mod datastore;
pub mod error;
pub mod profile;
pub mod schema;
pub mod storage;
pub mod sync;
pub mod types;
pub mod url_normalize;

pub use datastore::{AddItemOptions, AddVisitOptions, DatastoreService, ItemUpdateFields};
pub use error::{ErrorKind, PeekError, Result};
pub use profile::{Profile, ProfileManager, SyncConfig};
pub use storage::{SqliteBackend, StorageBackend};
pub use sync::SyncEngine;
pub use types::{Item, ItemFilter, ItemPatch, ItemType, SortBy, Stats, SyncSource, Tag};

/// Current Unix-ms timestamp. Centralized so every write path stamps
/// `created_at`/`updated_at`/`synced_at` from the same clock source.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
