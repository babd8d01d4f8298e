//! spec §4.6: "A one-time server migration moves legacy
//! `data/{userId}/peek.db` to `data/{userId}/profiles/default/datastore.sqlite`
//! ... Migration is idempotent."

use std::path::Path;

use peek_datastore::{PeekError, Result};
use tracing::info;

/// Moves the legacy single-file database into the per-profile layout, if
/// present and not already migrated. Safe to call on every boot.
pub fn migrate_user(data_root: &Path, user_id: &str) -> Result<bool> {
    let legacy_path = data_root.join(user_id).join("peek.db");
    if !legacy_path.exists() {
        return Ok(false);
    }

    let target_dir = data_root.join(user_id).join("profiles").join("default");
    let target_path = target_dir.join("datastore.sqlite");
    if target_path.exists() {
        info!(user_id, "legacy peek.db present but default profile already migrated, skipping");
        return Ok(false);
    }

    std::fs::create_dir_all(&target_dir)
        .map_err(|e| PeekError::Storage(format!("creating {target_dir:?}: {e}")))?;
    std::fs::rename(&legacy_path, &target_path)
        .map_err(|e| PeekError::Storage(format!("moving {legacy_path:?} to {target_path:?}: {e}")))?;
    info!(user_id, "migrated legacy peek.db to default profile");
    Ok(true)
}
