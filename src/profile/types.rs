//! Profile metadata (spec §4.4) — lives in `profiles.db`, a database
//! separate from any profile's `datastore.sqlite`.

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub sync_enabled: bool,
    pub api_key: Option<String>,
    pub server_profile_slug: Option<String>,
    pub last_sync_at: i64,
    pub created_at: i64,
    pub last_used_at: i64,
    pub is_default: bool,
}

/// Per-profile sync configuration (spec §4.4 `getSyncConfig`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncConfig {
    pub sync_enabled: bool,
    pub api_key: Option<String>,
    pub server_profile_slug: Option<String>,
    pub last_sync_at: i64,
}

impl Profile {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            sync_enabled: self.sync_enabled,
            api_key: self.api_key.clone(),
            server_profile_slug: self.server_profile_slug.clone(),
            last_sync_at: self.last_sync_at,
        }
    }
}
