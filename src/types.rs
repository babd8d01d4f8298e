//! Unified data model (spec §3): items, tags, item-tag links, settings and
//! migration markers, plus the filter/patch shapes the storage adapter and
//! datastore service pass around.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `item.type` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Url,
    Text,
    Tagset,
    Image,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Url => "url",
            ItemType::Text => "text",
            ItemType::Tagset => "tagset",
            ItemType::Image => "image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "url" => Some(ItemType::Url),
            "text" => Some(ItemType::Text),
            "tagset" => Some(ItemType::Tagset),
            "image" => Some(ItemType::Image),
            _ => None,
        }
    }
}

/// `item.syncSource` (spec §3): `""` = local-only, `"server"` = known to
/// the server. Modeled as a typed enum rather than a bare string so the
/// invariant in spec §8 ("for all items with syncSource == server,
/// syncId != """) is a type-level distinction, not a string comparison
/// scattered through the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncSource {
    #[default]
    Local,
    Server,
}

impl SyncSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::Local => "",
            SyncSource::Server => "server",
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s == "server" {
            SyncSource::Server
        } else {
            SyncSource::Local
        }
    }
}

/// The unified content entity (spec §3 Item).
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub item_type: ItemType,
    pub content: Option<String>,
    pub mime_type: String,
    pub metadata: Value,

    pub sync_id: String,
    pub sync_source: SyncSource,
    pub synced_at: i64,

    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: i64,

    pub starred: bool,
    pub archived: bool,
    pub visit_count: i64,
    pub last_visit_at: i64,
}

impl Item {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at > 0
    }
}

/// Normalized tag dictionary entry (spec §3 Tag).
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub color: Option<String>,
    pub parent_id: Option<String>,
    pub frequency: i64,
    pub last_used_at: i64,
    pub frecency_score: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Many-to-many item/tag join row (spec §3 ItemTag).
#[derive(Debug, Clone, PartialEq)]
pub struct ItemTag {
    pub id: String,
    pub item_id: String,
    pub tag_id: String,
    pub created_at: i64,
}

/// Namespaced key/value setting (spec §3 Setting). `value` is a
/// JSON-encoded string, stored opaque by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub extension_id: String,
    pub key: String,
    pub value: String,
    pub updated_at: i64,
}

/// Migration marker status (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Complete,
    Failed,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Complete => "complete",
            MigrationStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    pub id: String,
    pub status: MigrationStatus,
    pub completed_at: i64,
}

/// Sort key for `list_items` (spec §4.1 Filters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Created,
    Updated,
}

/// Filter for `StorageBackend::list_items` / `DatastoreService::query_items`
/// (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    pub since: Option<i64>,
    pub tag: Option<String>,
    pub limit: Option<usize>,
    pub sort_by: SortBy,
    pub include_deleted: bool,
}

/// Partial update for `StorageBackend::update_item` — `None` fields are
/// left untouched (spec §4.1: "undefined fields skipped").
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub content: Option<String>,
    pub mime_type: Option<String>,
    pub metadata: Option<Value>,
    pub sync_id: Option<String>,
    pub sync_source: Option<SyncSource>,
    pub synced_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub created_at: Option<i64>,
    pub starred: Option<bool>,
    pub archived: Option<bool>,
    pub visit_count: Option<i64>,
    pub last_visit_at: Option<i64>,
}

/// Aggregate counts returned by `getStats` (spec §4.3, supplemented per
/// SPEC_FULL §11 with a per-type breakdown and sync-pending count).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total_items: i64,
    pub urls: i64,
    pub texts: i64,
    pub tagsets: i64,
    pub images: i64,
    pub deleted_items: i64,
    pub tags: i64,
    pub item_tags: i64,
    pub pending_sync: i64,
}
