//! Wire shapes and the transport trait for the sync engine (spec §4.5,
//! §6). HTTP transport itself is out of scope (spec §1 Non-goals); this
//! module defines the contract a real transport implements, the same way
//! the teacher draws the line between `SyncTransport` (network, supplied
//! by the caller) and its own sync engine (protocol logic only).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Item as it appears on the wire (spec §4.5 Pull, §6 Item body).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    /// ISO-8601 UTC (spec §4.5, §6).
    pub created_at: String,
    pub updated_at: String,
}

/// Body of a push `POST /items` (spec §6 Item body).
#[derive(Debug, Clone, Serialize)]
pub struct PushItemBody {
    #[serde(rename = "type")]
    pub item_type: String,
    pub content: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
}

/// Response to a push `POST /items` (spec §6: `{id, created: bool}`).
#[derive(Debug, Clone, Deserialize)]
pub struct PushItemResponse {
    pub id: String,
    pub created: bool,
}

/// Response body of a pull `GET /items` / `GET /items/since/{ISO}`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PullResponse {
    pub items: Vec<WireItem>,
}

/// The three version headers carried on every request and response
/// (spec §4.5 Wire protocol).
#[derive(Debug, Clone, Default)]
pub struct VersionHeaders {
    pub datastore_version: Option<String>,
    pub protocol_version: Option<String>,
    pub client: Option<String>,
}

pub const HEADER_DATASTORE_VERSION: &str = "X-Peek-Datastore-Version";
pub const HEADER_PROTOCOL_VERSION: &str = "X-Peek-Protocol-Version";
pub const HEADER_CLIENT: &str = "X-Peek-Client";

/// Fails with `ErrorKind::Version` if the server sent either header and it
/// disagrees with ours; absence of both headers is treated as a legacy
/// server and let through (spec §4.5 Wire protocol).
pub fn check_version_headers(ours: &VersionHeaders, theirs: &VersionHeaders) -> Result<(), (String, String)> {
    if theirs.datastore_version.is_none() && theirs.protocol_version.is_none() {
        return Ok(());
    }
    if let (Some(ref mine), Some(ref server)) = (&ours.datastore_version, &theirs.datastore_version) {
        if mine != server {
            return Err((mine.clone(), server.clone()));
        }
    }
    if let (Some(ref mine), Some(ref server)) = (&ours.protocol_version, &theirs.protocol_version) {
        if mine != server {
            return Err((mine.clone(), server.clone()));
        }
    }
    Ok(())
}

/// User-provided network layer for the sync engine (spec §1 Non-goals:
/// "HTTP transport primitives ... are out of scope" — only this contract
/// is defined here).
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn pull(
        &self,
        profile_id: &str,
        slug: &str,
        since: Option<&str>,
    ) -> Result<(PullResponse, VersionHeaders), SyncTransportError>;

    async fn push_item(
        &self,
        profile_id: &str,
        slug: &str,
        body: &PushItemBody,
    ) -> Result<(PushItemResponse, VersionHeaders), SyncTransportError>;
}

#[derive(Debug, Clone)]
pub struct SyncTransportError {
    pub message: String,
    pub kind: ErrorKind,
}

impl SyncTransportError {
    pub fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::Transport)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::Auth)
    }
}

impl std::fmt::Display for SyncTransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyncTransportError {}

/// Per-phase counters accumulated across a `syncAll` (spec §4.5, §7
/// Propagation policy).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncCounters {
    pub pulled: usize,
    pub pushed: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl SyncCounters {
    pub fn merge(&mut self, other: &SyncCounters) {
        self.pulled += other.pulled;
        self.pushed += other.pushed;
        self.conflicts += other.conflicts;
        self.failed += other.failed;
    }
}

/// `status()` surface (spec §4.5 Status).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub configured: bool,
    pub pending_count: i64,
    pub last_sync_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_headers_are_treated_as_legacy() {
        let ours = VersionHeaders {
            datastore_version: Some("3".into()),
            protocol_version: Some("1".into()),
            client: Some("peek-desktop".into()),
        };
        let theirs = VersionHeaders::default();
        assert!(check_version_headers(&ours, &theirs).is_ok());
    }

    #[test]
    fn mismatched_datastore_version_fails() {
        let ours = VersionHeaders {
            datastore_version: Some("3".into()),
            ..Default::default()
        };
        let theirs = VersionHeaders {
            datastore_version: Some("4".into()),
            ..Default::default()
        };
        assert!(check_version_headers(&ours, &theirs).is_err());
    }

    #[test]
    fn matching_versions_pass() {
        let ours = VersionHeaders {
            datastore_version: Some("3".into()),
            protocol_version: Some("1".into()),
            ..Default::default()
        };
        let theirs = ours.clone();
        assert!(check_version_headers(&ours, &theirs).is_ok());
    }
}
