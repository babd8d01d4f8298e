//! Per-`(user, profile)` connection pool (spec §4.6: "Connection pool
//! keyed by `userId:slug`").

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use peek_datastore::{PeekError, Result, SqliteBackend};

use crate::legacy_migration;

pub struct ConnectionPool {
    data_root: PathBuf,
    connections: DashMap<String, Arc<SqliteBackend>>,
}

impl ConnectionPool {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            connections: DashMap::new(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn datastore_path(&self, user_id: &str, slug: &str) -> PathBuf {
        self.data_root
            .join(user_id)
            .join("profiles")
            .join(slug)
            .join("datastore.sqlite")
    }

    /// Opens (and caches) the backend for `userId:slug`, creating parent
    /// directories on first use.
    pub fn get_or_open(&self, user_id: &str, slug: &str) -> Result<Arc<SqliteBackend>> {
        let key = format!("{user_id}:{slug}");
        if let Some(existing) = self.connections.get(&key) {
            return Ok(existing.clone());
        }

        if slug == "default" {
            legacy_migration::migrate_user(&self.data_root, user_id)?;
        }

        let path = self.datastore_path(user_id, slug);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PeekError::Storage(format!("creating {parent:?}: {e}")))?;
        }

        let backend = Arc::new(SqliteBackend::open(&path)?);
        self.connections.insert(key, backend.clone());
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn get_or_open_caches_the_same_backend_for_repeated_calls() {
        let dir = tempdir().unwrap();
        let pool = ConnectionPool::new(dir.path());
        let a = pool.get_or_open("user-1", "default").unwrap();
        let b = pool.get_or_open("user-1", "default").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_profiles_get_distinct_backends() {
        let dir = tempdir().unwrap();
        let pool = ConnectionPool::new(dir.path());
        let a = pool.get_or_open("user-1", "default").unwrap();
        let b = pool.get_or_open("user-1", "work").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
