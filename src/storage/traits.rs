//! Storage adapter interface (spec §4.1): a single async surface that
//! hides the underlying driver. Every method returns a future even though
//! the SQLite implementation never actually suspends — this keeps the
//! trait usable behind `Arc<dyn StorageBackend>` from the async sync
//! engine without a second, blocking-only trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Item, ItemFilter, ItemPatch, ItemType, Stats, Tag};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    // -- items --------------------------------------------------------
    async fn get_item(&self, id: &str) -> Result<Option<Item>>;
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>>;
    async fn insert_item(&self, item: &Item) -> Result<()>;
    async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<()>;
    async fn soft_delete_item(&self, id: &str, now: i64) -> Result<()>;
    async fn hard_delete_item(&self, id: &str) -> Result<()>;

    // -- tags -----------------------------------------------------------
    async fn get_tag(&self, id: &str) -> Result<Option<Tag>>;
    async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;
    async fn insert_tag(&self, tag: &Tag) -> Result<()>;
    async fn update_tag(&self, tag: &Tag) -> Result<()>;
    async fn list_all_tags(&self) -> Result<Vec<Tag>>;

    // -- item-tags --------------------------------------------------------
    async fn get_tags_for_item(&self, item_id: &str) -> Result<Vec<Tag>>;
    async fn get_items_for_tag(&self, tag_id: &str) -> Result<Vec<Item>>;
    /// Returns `true` if a new link was created, `false` if it already existed.
    async fn link(&self, item_id: &str, tag_id: &str) -> Result<bool>;
    async fn unlink(&self, item_id: &str, tag_id: &str) -> Result<()>;
    async fn clear_for_item(&self, item_id: &str) -> Result<()>;

    // -- settings ---------------------------------------------------------
    async fn get_setting(&self, extension_id: &str, key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, extension_id: &str, key: &str, value: &str, now: i64) -> Result<()>;

    // -- visits -------------------------------------------------------
    /// Record a visit row and bump the item's `visitCount`/`lastVisitAt`
    /// (spec §4.3 `addVisit`).
    async fn record_visit(
        &self,
        item_id: &str,
        visited_at: i64,
        metadata: &serde_json::Value,
    ) -> Result<()>;

    // -- lookups ------------------------------------------------------
    /// The item whose `id == x` OR `syncId == x` (spec §4.1).
    async fn find_item_by_sync_id(&self, x: &str) -> Result<Option<Item>>;
    async fn find_item_by_content(&self, item_type: ItemType, content: &str) -> Result<Option<Item>>;
    /// First non-deleted tagset whose tag name set, sorted, equals
    /// `sorted_tab_separated` (spec §4.1).
    async fn find_tagset_by_tags(&self, sorted_tab_separated: &str) -> Result<Option<Item>>;

    async fn stats(&self) -> Result<Stats>;

    /// Items the sync engine's push phase must send (spec §4.5 Push):
    /// `syncSource == ""`, plus — once a sync has run at least once —
    /// items with `syncedAt > 0 AND updatedAt > syncedAt`.
    async fn items_pending_push(&self, last_sync_time: i64) -> Result<Vec<Item>>;
}
