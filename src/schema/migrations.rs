//! Ordered, idempotent migration runner (spec §4.2).
//!
//! Each migration is `(name, run)`. A migration is skipped when its row
//! exists in `migrations` with `status = "complete"`. The runner executes
//! in declaration order, records the marker after success, and logs and
//! continues on failure — a failed migration neither blocks later ones
//! nor records completion (spec §4.2, §7).

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::MigrationStatus;

use super::tinybase::migrate_tinybase;

pub type MigrationFn = fn(&Connection) -> Result<()>;

pub struct Migration {
    pub name: &'static str,
    pub run: MigrationFn,
}

/// Declaration-order list of migrations run on every open (spec §4.2 Open-time
/// sequence, step 4). New migrations are appended here — never reordered or
/// removed once shipped, since `migrations.id` is the idempotence key.
pub fn ordered_migrations() -> Vec<Migration> {
    vec![Migration {
        name: "tinybase_to_tables",
        run: migrate_tinybase,
    }]
}

fn migration_status(conn: &Connection, name: &str) -> Result<Option<MigrationStatus>> {
    let mut stmt = conn.prepare("SELECT status FROM migrations WHERE id = ?1")?;
    let mut rows = stmt.query(rusqlite::params![name])?;
    if let Some(row) = rows.next()? {
        let status: String = row.get(0)?;
        Ok(Some(if status == "complete" {
            MigrationStatus::Complete
        } else {
            MigrationStatus::Failed
        }))
    } else {
        Ok(None)
    }
}

fn record_migration(conn: &Connection, name: &str, status: MigrationStatus, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO migrations (id, status, completed_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET status = excluded.status, completed_at = excluded.completed_at",
        rusqlite::params![name, status.as_str(), now],
    )?;
    Ok(())
}

/// Run every migration that has not already completed. Failures are
/// logged and skipped; the caller (the storage adapter's open sequence)
/// always proceeds (spec §4.2, §7: "Migration failures are logged and
/// skipped; the app continues").
pub fn run_migrations(conn: &Connection) -> Result<()> {
    for migration in ordered_migrations() {
        if matches!(
            migration_status(conn, migration.name)?,
            Some(MigrationStatus::Complete)
        ) {
            debug!(migration = migration.name, "migration already complete, skipping");
            continue;
        }

        let now = crate::now_ms();
        match (migration.run)(conn) {
            Ok(()) => {
                record_migration(conn, migration.name, MigrationStatus::Complete, now)?;
            }
            Err(e) => {
                warn!(migration = migration.name, error = %e, "migration failed, continuing");
                // Do not record completion — a future boot may retry.
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ddl::all_ddl_statements;

    fn open_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in all_ddl_statements() {
            conn.execute(stmt, []).unwrap();
        }
        conn
    }

    #[test]
    fn running_migrations_twice_is_idempotent() {
        let conn = open_schema();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations WHERE status = 'complete'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(count, ordered_migrations().len() as i64);
    }
}
