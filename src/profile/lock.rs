//! Single-instance lock (spec §4.4): non-dev/non-test profiles acquire an
//! advisory lock on `.peek.lock` under the user-data root so a second
//! launch can detect the primary instance and relay its URL instead of
//! opening a second connection to the same `datastore.sqlite`.
//!
//! Grounded on the advisory-locking pattern pulled in for cross-process
//! writer detection elsewhere in the pack (see DESIGN.md) — `fs2` is not
//! part of the teacher's own dependency stack, but the teacher has no
//! single-instance concept of its own to generalize from.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::{PeekError, Result};

/// Held for the lifetime of the process; dropping it releases the lock.
pub struct InstanceLock {
    _file: File,
}

impl InstanceLock {
    /// Attempts to acquire the lock file at `path`. Returns `Ok(None)` if
    /// another instance already holds it (the caller should relay its
    /// launch URL to the primary and exit), `Ok(Some(lock))` on success.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| PeekError::Storage(format!("opening lock file {path:?}: {e}")))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(InstanceLock { _file: file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(PeekError::Storage(format!("locking {path:?}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_is_blocked_until_first_drops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".peek.lock");

        let first = InstanceLock::try_acquire(&path).unwrap();
        assert!(first.is_some());

        let second = InstanceLock::try_acquire(&path).unwrap();
        assert!(second.is_none());

        drop(first);
        let third = InstanceLock::try_acquire(&path).unwrap();
        assert!(third.is_some());
    }
}
