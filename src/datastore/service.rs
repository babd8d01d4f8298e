//! Public datastore surface (spec §4.3): CRUD + query on top of the
//! storage adapter, tag resolution with frecency, visits, settings and
//! stats.
//!
//! The JS-era `{success, data?, error?}` uniform result shape (spec §4.3)
//! is `Result<T, PeekError>` here — see SPEC_FULL.md §10.1.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::datastore::frecency::frecency_score;
use crate::error::{ErrorKind, PeekError, Result};
use crate::now_ms;
use crate::storage::StorageBackend;
use crate::types::{Item, ItemFilter, ItemPatch, ItemType, Stats, SyncSource, Tag};
use crate::url_normalize::normalize_url;

/// Options for `add_item` (spec §4.3 `addItem`).
#[derive(Debug, Clone, Default)]
pub struct AddItemOptions {
    pub content: Option<String>,
    pub mime_type: Option<String>,
    pub metadata: Option<Value>,
    pub starred: bool,
    pub archived: bool,
}

/// Fields a caller may change via `update_item` (spec §4.3 `updateItem`:
/// "never mutates createdAt or syncId once set" — those fields are
/// deliberately absent here; the sync engine mutates them directly via
/// `StorageBackend`, per the ownership split in spec §3).
#[derive(Debug, Clone, Default)]
pub struct ItemUpdateFields {
    pub content: Option<String>,
    pub mime_type: Option<String>,
    pub metadata: Option<Value>,
    pub starred: Option<bool>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct AddVisitOptions {
    pub metadata: Option<Value>,
}

pub struct DatastoreService<B: StorageBackend> {
    backend: Arc<B>,
}

impl<B: StorageBackend> DatastoreService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// spec §4.3 `addItem`: generate id, normalize URL content, timestamp,
    /// insert. Returns the new item's id.
    pub async fn add_item(&self, item_type: ItemType, opts: AddItemOptions) -> Result<String> {
        let content = match (item_type, opts.content) {
            (ItemType::Url, Some(raw)) => Some(normalize_url(&raw)?),
            (_, content) => content,
        };

        let now = now_ms();
        let item = Item {
            id: uuid::Uuid::new_v4().to_string(),
            item_type,
            content,
            mime_type: opts.mime_type.unwrap_or_default(),
            metadata: opts.metadata.unwrap_or_else(|| serde_json::json!({})),
            sync_id: String::new(),
            sync_source: SyncSource::Local,
            synced_at: 0,
            created_at: now,
            updated_at: now,
            deleted_at: 0,
            starred: opts.starred,
            archived: opts.archived,
            visit_count: 0,
            last_visit_at: 0,
        };

        self.backend.insert_item(&item).await?;
        Ok(item.id)
    }

    /// spec §4.3 `updateItem`: partial update, always touches `updatedAt`.
    pub async fn update_item(&self, id: &str, fields: ItemUpdateFields) -> Result<()> {
        let patch = ItemPatch {
            content: fields.content,
            mime_type: fields.mime_type,
            metadata: fields.metadata,
            starred: fields.starred,
            archived: fields.archived,
            updated_at: Some(now_ms()),
            ..Default::default()
        };
        self.backend.update_item(id, &patch).await
    }

    /// spec §4.3 `deleteItem`: soft delete.
    pub async fn delete_item(&self, id: &str) -> Result<()> {
        self.backend.soft_delete_item(id, now_ms()).await
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        self.backend.get_item(id).await
    }

    pub async fn query_items(&self, filter: ItemFilter) -> Result<Vec<Item>> {
        self.backend.list_items(&filter).await
    }

    pub async fn find_item_by_content(&self, item_type: ItemType, content: &str) -> Result<Option<Item>> {
        let normalized = if item_type == ItemType::Url {
            normalize_url(content)?
        } else {
            content.to_string()
        };
        self.backend.find_item_by_content(item_type, &normalized).await
    }

    /// spec §4.3 `getOrCreateTag`: case-insensitive lookup then insert;
    /// a unique-violation race is recovered by re-reading (spec §7).
    pub async fn get_or_create_tag(&self, name: &str) -> Result<(Tag, bool)> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(PeekError::validation("tag name must not be empty"));
        }

        if let Some(tag) = self.backend.get_tag_by_name(trimmed).await? {
            return Ok((tag, false));
        }

        let now = now_ms();
        let tag = Tag {
            id: uuid::Uuid::new_v4().to_string(),
            name: trimmed.to_string(),
            slug: slugify(trimmed),
            color: None,
            parent_id: None,
            frequency: 0,
            last_used_at: 0,
            frecency_score: 0.0,
            created_at: now,
            updated_at: now,
        };

        match self.backend.insert_tag(&tag).await {
            Ok(()) => Ok((tag, true)),
            Err(e) if e.kind() == ErrorKind::Conflict => {
                debug!(name = trimmed, "tag insert raced, re-reading");
                let existing = self
                    .backend
                    .get_tag_by_name(trimmed)
                    .await?
                    .ok_or(e)?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    /// spec §4.3 `tagItem`: idempotent link; on link, bump frequency and
    /// recompute frecency. Returns `already_exists`.
    pub async fn tag_item(&self, item_id: &str, tag_id: &str) -> Result<bool> {
        let linked = self.backend.link(item_id, tag_id).await?;
        if linked {
            let mut tag = self
                .backend
                .get_tag(tag_id)
                .await?
                .ok_or_else(|| PeekError::not_found("tag", tag_id))?;
            let now = now_ms();
            tag.frequency += 1;
            tag.last_used_at = now;
            tag.frecency_score = frecency_score(tag.frequency, tag.last_used_at, now);
            tag.updated_at = now;
            self.backend.update_tag(&tag).await?;
        }
        Ok(!linked)
    }

    pub async fn untag_item(&self, item_id: &str, tag_id: &str) -> Result<()> {
        self.backend.unlink(item_id, tag_id).await
    }

    pub async fn get_item_tags(&self, item_id: &str) -> Result<Vec<Tag>> {
        self.backend.get_tags_for_item(item_id).await
    }

    pub async fn get_items_by_tag(&self, tag_id: &str) -> Result<Vec<Item>> {
        self.backend.get_items_for_tag(tag_id).await
    }

    /// spec §4.3 `getTagsByFrecency`: descending `frecencyScore`, stable
    /// tie-break on `updatedAt` (spec §8 invariant).
    pub async fn get_tags_by_frecency(&self) -> Result<Vec<Tag>> {
        let mut tags = self.backend.list_all_tags().await?;
        tags.sort_by(|a, b| {
            b.frecency_score
                .partial_cmp(&a.frecency_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        Ok(tags)
    }

    /// Recompute every tag's `frecencyScore` against the current time
    /// without a tagging event — used by callers that want an up-to-date
    /// ranking between tagging events (the score is otherwise only
    /// recomputed on `tagItem`).
    pub async fn refresh_frecency_scores(&self) -> Result<()> {
        let now = now_ms();
        for mut tag in self.backend.list_all_tags().await? {
            let refreshed = frecency_score(tag.frequency, tag.last_used_at, now);
            if (refreshed - tag.frecency_score).abs() > f64::EPSILON {
                tag.frecency_score = refreshed;
                self.backend.update_tag(&tag).await?;
            }
        }
        Ok(())
    }

    /// spec §4.3 `addVisit`.
    pub async fn add_visit(&self, item_id: &str, opts: AddVisitOptions) -> Result<()> {
        let metadata = opts.metadata.unwrap_or_else(|| serde_json::json!({}));
        self.backend.record_visit(item_id, now_ms(), &metadata).await
    }

    pub async fn set_setting(&self, namespace: &str, key: &str, json_value: &str) -> Result<()> {
        serde_json::from_str::<Value>(json_value)
            .map_err(|e| PeekError::validation(format!("setting value is not valid JSON: {e}")))?;
        self.backend.set_setting(namespace, key, json_value, now_ms()).await
    }

    pub async fn get_setting(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        self.backend.get_setting(namespace, key).await
    }

    pub async fn get_stats(&self) -> Result<Stats> {
        self.backend.stats().await
    }
}

fn slugify(name: &str) -> String {
    let re = regex::Regex::new(r"[^a-z0-9]+").unwrap();
    let lowered = name.to_ascii_lowercase();
    re.replace_all(&lowered, "-").trim_matches('-').to_string()
}
