//! `profiles.db` owner (spec §4.4). Mirrors `SqliteBackend`'s shape — a
//! single connection behind a `Mutex`, opened once, DDL run idempotently —
//! but against a second, smaller schema that the item-centric datastore
//! never touches (spec §5: "`profiles.db` is owned by the profile
//! manager").

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use crate::config::{BuildType, Env};
use crate::error::{PeekError, Result};
use crate::now_ms;

use super::paths::{chromium_dir, datastore_path, profile_dir, profiles_db_path};
use super::types::{Profile, SyncConfig};

const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        sync_enabled INTEGER NOT NULL DEFAULT 0,
        api_key TEXT,
        server_profile_slug TEXT,
        last_sync_at INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        last_used_at INTEGER NOT NULL DEFAULT 0,
        is_default INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS active_profile (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        profile_slug TEXT NOT NULL DEFAULT ''
    )"#,
];

pub struct ProfileManager {
    conn: Mutex<Connection>,
    user_data_root: PathBuf,
}

impl ProfileManager {
    /// spec §4.4 steps 1-3: open (create if missing), scan for
    /// pre-existing profile directories, ensure a default profile and the
    /// active-profile singleton exist.
    pub fn open(user_data_root: impl Into<PathBuf>) -> Result<Self> {
        let user_data_root = user_data_root.into();
        fs::create_dir_all(&user_data_root)
            .map_err(|e| PeekError::Storage(format!("creating {user_data_root:?}: {e}")))?;

        let conn = Connection::open(profiles_db_path(&user_data_root))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        for stmt in DDL {
            conn.execute(stmt, [])?;
        }

        let manager = Self {
            conn: Mutex::new(conn),
            user_data_root,
        };

        manager.scan_existing_profile_dirs()?;
        manager.ensure_default_profile()?;
        Ok(manager)
    }

    pub fn user_data_root(&self) -> &Path {
        &self.user_data_root
    }

    /// spec §4.4 step 2: a pre-existing `{slug}/datastore.sqlite` with no
    /// matching row gets one inserted, so upgrading Peek onto an existing
    /// data directory doesn't orphan it.
    fn scan_existing_profile_dirs(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.user_data_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(PeekError::Storage(format!(
                    "scanning {:?}: {e}",
                    self.user_data_root
                )))
            }
        };

        for entry in entries {
            let entry = entry.map_err(|e| PeekError::Storage(e.to_string()))?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let slug = entry.file_name().to_string_lossy().to_string();
            if !datastore_path(&self.user_data_root, &slug).exists() {
                continue;
            }
            if self.get_by_slug(&slug)?.is_some() {
                continue;
            }

            info!(slug = slug.as_str(), "adopting pre-existing profile directory");
            let now = now_ms();
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO profiles (id, name, slug, sync_enabled, api_key, server_profile_slug, last_sync_at, created_at, last_used_at, is_default)
                 VALUES (?1, ?2, ?3, 0, NULL, NULL, 0, ?4, ?4, 0)",
                rusqlite::params![uuid::Uuid::new_v4().to_string(), slug, slug, now],
            )?;
        }
        Ok(())
    }

    /// spec §4.4 step 3.
    fn ensure_default_profile(&self) -> Result<()> {
        let conn = self.conn.lock();
        let has_default: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE is_default = 1)",
            [],
            |row| row.get(0),
        )?;

        if !has_default {
            let now = now_ms();
            let existing_default: Option<String> = conn
                .query_row(
                    "SELECT id FROM profiles WHERE slug = 'default'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            match existing_default {
                Some(id) => {
                    conn.execute("UPDATE profiles SET is_default = 1 WHERE id = ?1", [&id])?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO profiles (id, name, slug, sync_enabled, api_key, server_profile_slug, last_sync_at, created_at, last_used_at, is_default)
                         VALUES (?1, 'Default', 'default', 0, NULL, NULL, 0, ?2, ?2, 1)",
                        rusqlite::params![uuid::Uuid::new_v4().to_string(), now],
                    )?;
                }
            }
        }

        let active_is_empty: bool = conn.query_row(
            "SELECT COALESCE((SELECT profile_slug FROM active_profile WHERE id = 0), '') = ''",
            [],
            |row| row.get(0),
        )?;
        if active_is_empty {
            let default_slug: String = conn.query_row(
                "SELECT slug FROM profiles WHERE is_default = 1 LIMIT 1",
                [],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO active_profile (id, profile_slug) VALUES (0, ?1)
                 ON CONFLICT(id) DO UPDATE SET profile_slug = excluded.profile_slug",
                [&default_slug],
            )?;
        }
        Ok(())
    }

    /// spec §4.4 step 4: explicit env override, then dev-build pin, then
    /// the active-profile row, then `default`.
    pub fn resolve_active_profile(&self, env: &Env, build_type: BuildType) -> Result<Profile> {
        let slug = if let Some(ref forced) = env.profile_override {
            info!(slug = forced.as_str(), "profile resolved via environment override");
            forced.clone()
        } else if build_type == BuildType::Development {
            info!("profile resolved to 'dev' via development build type");
            "dev".to_string()
        } else {
            let conn = self.conn.lock();
            let row_slug: Option<String> = conn
                .query_row(
                    "SELECT profile_slug FROM active_profile WHERE id = 0",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            match row_slug.filter(|s| !s.is_empty()) {
                Some(slug) => slug,
                None => "default".to_string(),
            }
        };

        match self.get_by_slug(&slug)? {
            Some(profile) => Ok(profile),
            None => self.create_profile(&slug, &slug, slug == "default"),
        }
    }

    fn create_profile(&self, name: &str, slug: &str, is_default: bool) -> Result<Profile> {
        let now = now_ms();
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO profiles (id, name, slug, sync_enabled, api_key, server_profile_slug, last_sync_at, created_at, last_used_at, is_default)
             VALUES (?1, ?2, ?3, 0, NULL, NULL, 0, ?4, ?4, ?5)",
            rusqlite::params![id, name, slug, now, is_default as i64],
        )?;
        drop(conn);
        Ok(self.get_by_slug(slug)?.expect("just inserted"))
    }

    pub fn get_by_slug(&self, slug: &str) -> Result<Option<Profile>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT * FROM profiles WHERE slug = ?1", [slug], row_to_profile)
            .optional()
            .map_err(Into::into)
    }

    pub fn get(&self, id: &str) -> Result<Option<Profile>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT * FROM profiles WHERE id = ?1", [id], row_to_profile)
            .optional()
            .map_err(Into::into)
    }

    pub fn list(&self) -> Result<Vec<Profile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM profiles ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_profile)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// spec §4.5 in passing, §4.4 Sync-config ops.
    pub fn enable_sync(&self, profile_id: &str, api_key: &str, server_profile_slug: &str) -> Result<()> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE profiles SET sync_enabled = 1, api_key = ?1, server_profile_slug = ?2 WHERE id = ?3",
            rusqlite::params![api_key, server_profile_slug, profile_id],
        )?;
        if affected == 0 {
            return Err(PeekError::not_found("profile", profile_id));
        }
        Ok(())
    }

    pub fn disable_sync(&self, profile_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE profiles SET sync_enabled = 0, api_key = NULL, server_profile_slug = NULL WHERE id = ?1",
            [profile_id],
        )?;
        if affected == 0 {
            return Err(PeekError::not_found("profile", profile_id));
        }
        Ok(())
    }

    pub fn get_sync_config(&self, profile_id: &str) -> Result<SyncConfig> {
        let profile = self
            .get(profile_id)?
            .ok_or_else(|| PeekError::not_found("profile", profile_id))?;
        Ok(profile.sync_config())
    }

    pub fn update_last_sync_at(&self, profile_id: &str, last_sync_at: i64) -> Result<()> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE profiles SET last_sync_at = ?1 WHERE id = ?2",
            rusqlite::params![last_sync_at, profile_id],
        )?;
        if affected == 0 {
            return Err(PeekError::not_found("profile", profile_id));
        }
        Ok(())
    }

    /// spec §4.4 Deletions: removes the row only, on-disk data is kept.
    /// The active profile cannot be deleted.
    pub fn delete_profile(&self, profile_id: &str) -> Result<()> {
        let profile = self
            .get(profile_id)?
            .ok_or_else(|| PeekError::not_found("profile", profile_id))?;

        let conn = self.conn.lock();
        let active_slug: String = conn
            .query_row(
                "SELECT profile_slug FROM active_profile WHERE id = 0",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_default();
        if active_slug == profile.slug {
            return Err(PeekError::validation("cannot delete the active profile"));
        }

        conn.execute("DELETE FROM profiles WHERE id = ?1", [profile_id])?;
        Ok(())
    }

    /// spec §4.4 step 5: construct and create the per-profile directory
    /// layout, ready for the datastore service to open.
    pub fn ensure_profile_dirs(&self, slug: &str) -> Result<PathBuf> {
        let dir = profile_dir(&self.user_data_root, slug);
        fs::create_dir_all(&dir).map_err(|e| PeekError::Storage(format!("creating {dir:?}: {e}")))?;
        fs::create_dir_all(chromium_dir(&self.user_data_root, slug))
            .map_err(|e| PeekError::Storage(format!("creating chromium dir under {dir:?}: {e}")))?;
        Ok(datastore_path(&self.user_data_root, slug))
    }
}

fn row_to_profile(row: &Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get("id")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
        sync_enabled: row.get::<_, i64>("sync_enabled")? != 0,
        api_key: row.get("api_key")?,
        server_profile_slug: row.get("server_profile_slug")?,
        last_sync_at: row.get("last_sync_at")?,
        created_at: row.get("created_at")?,
        last_used_at: row.get("last_used_at")?,
        is_default: row.get::<_, i64>("is_default")? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_default_profile_and_active_row() {
        let dir = tempdir().unwrap();
        let mgr = ProfileManager::open(dir.path()).unwrap();
        let profiles = mgr.list().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].slug, "default");
        assert!(profiles[0].is_default);
    }

    #[test]
    fn resolve_active_profile_env_override_wins() {
        let dir = tempdir().unwrap();
        let mgr = ProfileManager::open(dir.path()).unwrap();
        let env = Env {
            profile_override: Some("work".to_string()),
            debug: false,
        };
        let profile = mgr.resolve_active_profile(&env, BuildType::Production).unwrap();
        assert_eq!(profile.slug, "work");
    }

    #[test]
    fn resolve_active_profile_dev_build_always_dev() {
        let dir = tempdir().unwrap();
        let mgr = ProfileManager::open(dir.path()).unwrap();
        let env = Env::default();
        let profile = mgr.resolve_active_profile(&env, BuildType::Development).unwrap();
        assert_eq!(profile.slug, "dev");
    }

    #[test]
    fn resolve_active_profile_falls_back_to_default_row() {
        let dir = tempdir().unwrap();
        let mgr = ProfileManager::open(dir.path()).unwrap();
        let env = Env::default();
        let profile = mgr.resolve_active_profile(&env, BuildType::Production).unwrap();
        assert_eq!(profile.slug, "default");
    }

    #[test]
    fn scan_adopts_pre_existing_profile_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("legacy")).unwrap();
        fs::write(dir.path().join("legacy/datastore.sqlite"), b"").unwrap();

        let mgr = ProfileManager::open(dir.path()).unwrap();
        assert!(mgr.get_by_slug("legacy").unwrap().is_some());
    }

    #[test]
    fn active_profile_cannot_be_deleted() {
        let dir = tempdir().unwrap();
        let mgr = ProfileManager::open(dir.path()).unwrap();
        let active = mgr.resolve_active_profile(&Env::default(), BuildType::Production).unwrap();
        let err = mgr.delete_profile(&active.id).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
