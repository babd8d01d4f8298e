//! On-disk layout under the user-data root (spec §6):
//!
//! ```text
//! {userData}/
//!   profiles.db
//!   .peek.lock
//!   {slug}/
//!     datastore.sqlite
//!     chromium/
//! ```

use std::path::{Path, PathBuf};

pub fn profiles_db_path(user_data_root: &Path) -> PathBuf {
    user_data_root.join("profiles.db")
}

pub fn lock_file_path(user_data_root: &Path) -> PathBuf {
    user_data_root.join(".peek.lock")
}

pub fn profile_dir(user_data_root: &Path, slug: &str) -> PathBuf {
    user_data_root.join(slug)
}

pub fn datastore_path(user_data_root: &Path, slug: &str) -> PathBuf {
    profile_dir(user_data_root, slug).join("datastore.sqlite")
}

/// Opaque to this crate (spec §6) — created alongside `datastore.sqlite`
/// so the directory layout matches what the original bundles expect.
pub fn chromium_dir(user_data_root: &Path, slug: &str) -> PathBuf {
    profile_dir(user_data_root, slug).join("chromium")
}

/// `true` for the two slugs that are exempt from the single-instance lock
/// (spec §4.4 Single-instance policy).
pub fn is_lock_exempt(slug: &str) -> bool {
    slug == "dev" || slug == "test"
}
