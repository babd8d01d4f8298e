//! SQLite implementation of `StorageBackend` (spec §4.1, §4.2 Open-time
//! sequence).
//!
//! `SqliteBackend` owns a single `rusqlite::Connection` behind a
//! `parking_lot::Mutex`. This matches spec §5's "single-threaded
//! cooperative per profile" model: the connection is the serialization
//! point, every call is short and non-suspending, and the `Mutex` is never
//! held across an `.await`.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::{classify_sqlite_error, PeekError, Result};
use crate::schema::ddl::all_ddl_statements;
use crate::schema::run_migrations;
use crate::types::{
    Item, ItemFilter, ItemPatch, ItemType, SortBy, Stats, SyncSource, Tag,
};

use super::traits::StorageBackend;

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    fn open_common(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        for stmt in all_ddl_statements() {
            conn.execute(stmt, [])?;
        }
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::open_common(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::open_common(conn)
    }
}

fn row_to_item(row: &Row) -> rusqlite::Result<Item> {
    let item_type: String = row.get("type")?;
    let metadata_raw: String = row.get("metadata")?;
    let sync_source: String = row.get("sync_source")?;
    Ok(Item {
        id: row.get("id")?,
        item_type: ItemType::from_str(&item_type).unwrap_or(ItemType::Text),
        content: row.get("content")?,
        mime_type: row.get("mime_type")?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::json!({})),
        sync_id: row.get("sync_id")?,
        sync_source: SyncSource::from_str(&sync_source),
        synced_at: row.get("synced_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
        starred: row.get::<_, i64>("starred")? != 0,
        archived: row.get::<_, i64>("archived")? != 0,
        visit_count: row.get("visit_count")?,
        last_visit_at: row.get("last_visit_at")?,
    })
}

fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
        color: row.get("color")?,
        parent_id: row.get("parent_id")?,
        frequency: row.get("frequency")?,
        last_used_at: row.get("last_used_at")?,
        frecency_score: row.get("frecency_score")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const ITEM_COLUMNS: &str = "id, type, content, mime_type, metadata, sync_id, sync_source, \
    synced_at, created_at, updated_at, deleted_at, starred, archived, visit_count, last_visit_at";

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let conn = self.conn.lock();
        let item = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                rusqlite::params![id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let conn = self.conn.lock();
        let mut sql = format!("SELECT DISTINCT i.{ITEM_COLUMNS} FROM items i");
        if filter.tag.is_some() {
            sql.push_str(" JOIN item_tags it ON it.item_id = i.id JOIN tags t ON t.id = it.tag_id");
        }
        let mut clauses: Vec<String> = Vec::new();
        if !filter.include_deleted {
            clauses.push("i.deleted_at = 0".to_string());
        }
        if filter.item_type.is_some() {
            clauses.push("i.type = ?".to_string());
        }
        if filter.since.is_some() {
            clauses.push("i.updated_at > ?".to_string());
        }
        if filter.tag.is_some() {
            clauses.push("t.name_lower = ?".to_string());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let order_col = match filter.sort_by {
            SortBy::Created => "i.created_at",
            SortBy::Updated => "i.updated_at",
        };
        sql.push_str(&format!(" ORDER BY {order_col} DESC"));
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(t) = filter.item_type {
            params.push(Box::new(t.as_str().to_string()));
        }
        if let Some(since) = filter.since {
            params.push(Box::new(since));
        }
        if let Some(tag) = &filter.tag {
            params.push(Box::new(tag.to_ascii_lowercase()));
        }
        if let Some(limit) = filter.limit {
            params.push(Box::new(limit as i64));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_item)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn insert_item(&self, item: &Item) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO items ({ITEM_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)"
            ),
            rusqlite::params![
                item.id,
                item.item_type.as_str(),
                item.content,
                item.mime_type,
                item.metadata.to_string(),
                item.sync_id,
                item.sync_source.as_str(),
                item.synced_at,
                item.created_at,
                item.updated_at,
                item.deleted_at,
                item.starred as i64,
                item.archived as i64,
                item.visit_count,
                item.last_visit_at,
            ],
        )
        .map_err(|e| classify_sqlite_error(e, "items", "id"))?;
        Ok(())
    }

    async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<()> {
        let conn = self.conn.lock();
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        macro_rules! set_field {
            ($col:literal, $val:expr) => {
                sets.push(format!("{} = ?", $col));
                params.push(Box::new($val));
            };
        }

        if let Some(v) = &patch.content {
            set_field!("content", v.clone());
        }
        if let Some(v) = &patch.mime_type {
            set_field!("mime_type", v.clone());
        }
        if let Some(v) = &patch.metadata {
            set_field!("metadata", v.to_string());
        }
        if let Some(v) = &patch.sync_id {
            set_field!("sync_id", v.clone());
        }
        if let Some(v) = patch.sync_source {
            set_field!("sync_source", v.as_str().to_string());
        }
        if let Some(v) = patch.synced_at {
            set_field!("synced_at", v);
        }
        if let Some(v) = patch.updated_at {
            set_field!("updated_at", v);
        }
        if let Some(v) = patch.created_at {
            set_field!("created_at", v);
        }
        if let Some(v) = patch.starred {
            set_field!("starred", v as i64);
        }
        if let Some(v) = patch.archived {
            set_field!("archived", v as i64);
        }
        if let Some(v) = patch.visit_count {
            set_field!("visit_count", v);
        }
        if let Some(v) = patch.last_visit_at {
            set_field!("last_visit_at", v);
        }

        if sets.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE items SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len() + 1
        );
        params.push(Box::new(id.to_string()));
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let affected = conn.execute(&sql, param_refs.as_slice())?;
        if affected == 0 {
            return Err(PeekError::not_found("item", id));
        }
        Ok(())
    }

    async fn soft_delete_item(&self, id: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE items SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        if affected == 0 {
            return Err(PeekError::not_found("item", id));
        }
        Ok(())
    }

    async fn hard_delete_item(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM item_tags WHERE item_id = ?1", rusqlite::params![id])?;
        conn.execute("DELETE FROM items WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
    }

    async fn get_tag(&self, id: &str) -> Result<Option<Tag>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, name, slug, color, parent_id, frequency, last_used_at, \
                 frecency_score, created_at, updated_at FROM tags WHERE id = ?1",
                rusqlite::params![id],
                row_to_tag,
            )
            .optional()?)
    }

    async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, name, slug, color, parent_id, frequency, last_used_at, \
                 frecency_score, created_at, updated_at FROM tags WHERE name_lower = ?1",
                rusqlite::params![name.to_ascii_lowercase()],
                row_to_tag,
            )
            .optional()?)
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tags (id, name, name_lower, slug, color, parent_id, frequency, \
             last_used_at, frecency_score, created_at, updated_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                tag.id,
                tag.name,
                tag.name.to_ascii_lowercase(),
                tag.slug,
                tag.color,
                tag.parent_id,
                tag.frequency,
                tag.last_used_at,
                tag.frecency_score,
                tag.created_at,
                tag.updated_at,
            ],
        )
        .map_err(|e| classify_sqlite_error(e, "tags", "name"))?;
        Ok(())
    }

    async fn update_tag(&self, tag: &Tag) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE tags SET name = ?1, name_lower = ?2, slug = ?3, color = ?4, parent_id = ?5, \
             frequency = ?6, last_used_at = ?7, frecency_score = ?8, updated_at = ?9 WHERE id = ?10",
            rusqlite::params![
                tag.name,
                tag.name.to_ascii_lowercase(),
                tag.slug,
                tag.color,
                tag.parent_id,
                tag.frequency,
                tag.last_used_at,
                tag.frecency_score,
                tag.updated_at,
                tag.id,
            ],
        )?;
        Ok(())
    }

    async fn list_all_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, slug, color, parent_id, frequency, last_used_at, \
             frecency_score, created_at, updated_at FROM tags",
        )?;
        let rows = stmt.query_map([], row_to_tag)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn get_tags_for_item(&self, item_id: &str) -> Result<Vec<Tag>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.slug, t.color, t.parent_id, t.frequency, t.last_used_at, \
             t.frecency_score, t.created_at, t.updated_at FROM tags t \
             JOIN item_tags it ON it.tag_id = t.id WHERE it.item_id = ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![item_id], row_to_tag)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn get_items_for_tag(&self, tag_id: &str) -> Result<Vec<Item>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT i.{ITEM_COLUMNS} FROM items i JOIN item_tags it ON it.item_id = i.id \
             WHERE it.tag_id = ?1 AND i.deleted_at = 0"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![tag_id], row_to_item)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    async fn link(&self, item_id: &str, tag_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM item_tags WHERE item_id = ?1 AND tag_id = ?2",
            rusqlite::params![item_id, tag_id],
            |r| r.get(0),
        )?;
        if exists > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO item_tags (id, item_id, tag_id, created_at) VALUES (?1,?2,?3,?4)",
            rusqlite::params![uuid::Uuid::new_v4().to_string(), item_id, tag_id, crate::now_ms()],
        )
        .map_err(|e| classify_sqlite_error(e, "item_tags", "item_id,tag_id"))?;
        Ok(true)
    }

    async fn unlink(&self, item_id: &str, tag_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM item_tags WHERE item_id = ?1 AND tag_id = ?2",
            rusqlite::params![item_id, tag_id],
        )?;
        Ok(())
    }

    async fn clear_for_item(&self, item_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM item_tags WHERE item_id = ?1", rusqlite::params![item_id])?;
        Ok(())
    }

    async fn get_setting(&self, extension_id: &str, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT value FROM settings WHERE extension_id = ?1 AND key = ?2",
                rusqlite::params![extension_id, key],
                |r| r.get(0),
            )
            .optional()?)
    }

    async fn set_setting(&self, extension_id: &str, key: &str, value: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (extension_id, key, value, updated_at) VALUES (?1,?2,?3,?4) \
             ON CONFLICT(extension_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![extension_id, key, value, now],
        )?;
        Ok(())
    }

    async fn record_visit(&self, item_id: &str, visited_at: i64, metadata: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO visits (id, item_id, visited_at, metadata) VALUES (?1,?2,?3,?4)",
            rusqlite::params![uuid::Uuid::new_v4().to_string(), item_id, visited_at, metadata.to_string()],
        )?;
        let affected = conn.execute(
            "UPDATE items SET visit_count = visit_count + 1, last_visit_at = ?1 WHERE id = ?2",
            rusqlite::params![visited_at, item_id],
        )?;
        if affected == 0 {
            return Err(PeekError::not_found("item", item_id));
        }
        Ok(())
    }

    async fn find_item_by_sync_id(&self, x: &str) -> Result<Option<Item>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1 OR sync_id = ?1 LIMIT 1");
        Ok(conn.query_row(&sql, rusqlite::params![x], row_to_item).optional()?)
    }

    async fn find_item_by_content(&self, item_type: ItemType, content: &str) -> Result<Option<Item>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE type = ?1 AND content = ?2 AND deleted_at = 0 LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, rusqlite::params![item_type.as_str(), content], row_to_item)
            .optional()?)
    }

    async fn find_tagset_by_tags(&self, sorted_tab_separated: &str) -> Result<Option<Item>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT i.{ITEM_COLUMNS} FROM items i WHERE i.type = 'tagset' AND i.deleted_at = 0"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map([], row_to_item)?;
        while let Some(item) = rows.next().transpose()? {
            let mut tags_stmt = conn.prepare(
                "SELECT t.name FROM tags t JOIN item_tags it ON it.tag_id = t.id \
                 WHERE it.item_id = ?1 ORDER BY t.name",
            )?;
            let names: Vec<String> = tags_stmt
                .query_map(rusqlite::params![item.id], |r| r.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            if names.join("\t") == sorted_tab_separated {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    async fn stats(&self) -> Result<Stats> {
        let conn = self.conn.lock();
        let mut stats = Stats::default();
        stats.total_items = conn.query_row("SELECT COUNT(*) FROM items WHERE deleted_at = 0", [], |r| r.get(0))?;
        stats.urls = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE type = 'url' AND deleted_at = 0",
            [],
            |r| r.get(0),
        )?;
        stats.texts = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE type = 'text' AND deleted_at = 0",
            [],
            |r| r.get(0),
        )?;
        stats.tagsets = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE type = 'tagset' AND deleted_at = 0",
            [],
            |r| r.get(0),
        )?;
        stats.images = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE type = 'image' AND deleted_at = 0",
            [],
            |r| r.get(0),
        )?;
        stats.deleted_items = conn.query_row("SELECT COUNT(*) FROM items WHERE deleted_at != 0", [], |r| r.get(0))?;
        stats.tags = conn.query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0))?;
        stats.item_tags = conn.query_row("SELECT COUNT(*) FROM item_tags", [], |r| r.get(0))?;
        stats.pending_sync = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE deleted_at = 0 AND \
             (sync_source = '' OR (synced_at > 0 AND updated_at > synced_at))",
            [],
            |r| r.get(0),
        )?;
        Ok(stats)
    }

    async fn items_pending_push(&self, last_sync_time: i64) -> Result<Vec<Item>> {
        let conn = self.conn.lock();
        let sql = if last_sync_time > 0 {
            format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE deleted_at = 0 AND \
                 (sync_source = '' OR (synced_at > 0 AND updated_at > synced_at))"
            )
        } else {
            format!("SELECT {ITEM_COLUMNS} FROM items WHERE deleted_at = 0 AND sync_source = ''")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_item)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(id: &str, item_type: ItemType, content: Option<&str>) -> Item {
        let now = 1_700_000_000_000;
        Item {
            id: id.to_string(),
            item_type,
            content: content.map(|s| s.to_string()),
            mime_type: String::new(),
            metadata: serde_json::json!({}),
            sync_id: String::new(),
            sync_source: SyncSource::Local,
            synced_at: 0,
            created_at: now,
            updated_at: now,
            deleted_at: 0,
            starred: false,
            archived: false,
            visit_count: 0,
            last_visit_at: 0,
        }
    }

    #[tokio::test]
    async fn insert_and_get_item_round_trips() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let item = make_item("i1", ItemType::Url, Some("https://example.com/"));
        backend.insert_item(&item).await.unwrap();

        let fetched = backend.get_item("i1").await.unwrap().unwrap();
        assert_eq!(fetched.content.as_deref(), Some("https://example.com/"));
        assert_eq!(fetched.item_type, ItemType::Url);
    }

    #[tokio::test]
    async fn list_items_excludes_deleted_by_default() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let a = make_item("a", ItemType::Text, Some("a"));
        let mut b = make_item("b", ItemType::Text, Some("b"));
        b.deleted_at = 1_700_000_000_001;
        backend.insert_item(&a).await.unwrap();
        backend.insert_item(&b).await.unwrap();

        let items = backend.list_items(&ItemFilter::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a");
    }

    #[tokio::test]
    async fn duplicate_tag_name_is_conflict() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let tag = Tag {
            id: "t1".to_string(),
            name: "Work".to_string(),
            slug: "work".to_string(),
            color: None,
            parent_id: None,
            frequency: 0,
            last_used_at: 0,
            frecency_score: 0.0,
            created_at: 0,
            updated_at: 0,
        };
        backend.insert_tag(&tag).await.unwrap();

        let mut dup = tag.clone();
        dup.id = "t2".to_string();
        dup.name = "WORK".to_string();
        let err = backend.insert_tag(&dup).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn link_is_idempotent() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let item = make_item("i1", ItemType::Text, Some("x"));
        backend.insert_item(&item).await.unwrap();
        let tag = Tag {
            id: "t1".to_string(),
            name: "work".to_string(),
            slug: "work".to_string(),
            color: None,
            parent_id: None,
            frequency: 0,
            last_used_at: 0,
            frecency_score: 0.0,
            created_at: 0,
            updated_at: 0,
        };
        backend.insert_tag(&tag).await.unwrap();

        assert!(backend.link("i1", "t1").await.unwrap());
        assert!(!backend.link("i1", "t1").await.unwrap());
    }

    #[tokio::test]
    async fn find_item_by_sync_id_matches_local_or_sync_id() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut item = make_item("local-1", ItemType::Text, Some("x"));
        item.sync_id = "srv-1".to_string();
        backend.insert_item(&item).await.unwrap();

        assert!(backend.find_item_by_sync_id("local-1").await.unwrap().is_some());
        assert!(backend.find_item_by_sync_id("srv-1").await.unwrap().is_some());
        assert!(backend.find_item_by_sync_id("nope").await.unwrap().is_none());
    }
}
