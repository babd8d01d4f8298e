//! Legacy TinyBase-in-SQLite blob → direct table layout migration
//! (spec §4.2, scenario §8.6).
//!
//! TinyBase persists its entire store as a single row: a JSON array
//! `[tables, values]` where `tables` is `{ tableId: { rowId: { cellId:
//! cellValue } } }`. This migration fans that blob out into the direct
//! tables this crate actually queries, then drops the legacy table.

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{PeekError, Result};
use crate::schema::ddl::known_destination_tables;

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        rusqlite::params![name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

fn any_destination_has_rows(conn: &Connection) -> Result<bool> {
    for (table, _) in known_destination_tables() {
        if !table_exists(conn, table)? {
            continue;
        }
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
        if count > 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

fn json_to_sql(v: &JsonValue) -> SqlValue {
    match v {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Null
            }
        }
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Insert one TinyBase row into `table`, restricted to `columns` (the
/// table's known column list, first entry treated as the row-id column).
fn insert_row(conn: &Connection, table: &str, columns: &[&str], row_id: &str, cells: &serde_json::Map<String, JsonValue>) -> Result<()> {
    let mut col_names: Vec<&str> = vec![columns[0]];
    let mut values: Vec<SqlValue> = vec![SqlValue::Text(row_id.to_string())];

    for col in &columns[1..] {
        if let Some(v) = cells.get(*col) {
            col_names.push(col);
            values.push(json_to_sql(v));
        }
    }

    let placeholders: Vec<String> = (1..=col_names.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT OR IGNORE INTO {table} ({}) VALUES ({})",
        col_names.join(", "),
        placeholders.join(", ")
    );
    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
    conn.execute(&sql, params.as_slice())?;
    Ok(())
}

pub fn migrate_tinybase(conn: &Connection) -> Result<()> {
    if !table_exists(conn, "tinybase")? {
        debug!("no legacy tinybase table present, nothing to migrate");
        return Ok(());
    }

    if any_destination_has_rows(conn)? {
        debug!("destination tables already populated, treating tinybase migration as complete");
        return Ok(());
    }

    let blob: Option<String> = conn
        .query_row("SELECT data FROM tinybase LIMIT 1", [], |r| r.get(0))
        .ok();
    let Some(blob) = blob else {
        warn!("tinybase table present but empty, dropping");
        conn.execute("DROP TABLE tinybase", [])?;
        return Ok(());
    };

    let parsed: JsonValue = serde_json::from_str(&blob)
        .map_err(|e| PeekError::Storage(format!("invalid tinybase blob: {e}")))?;
    let tables = parsed
        .as_array()
        .and_then(|a| a.first())
        .and_then(|t| t.as_object())
        .ok_or_else(|| PeekError::Storage("tinybase blob missing tables object".to_string()))?;

    let known = known_destination_tables();

    for (table_id, rows) in tables {
        let Some((table_name, columns)) = known.iter().find(|(name, _)| name == table_id) else {
            debug!(table = table_id, "unknown tinybase table, skipping");
            continue;
        };
        let Some(rows_obj) = rows.as_object() else {
            continue;
        };
        for (row_id, cells) in rows_obj {
            let Some(cells_obj) = cells.as_object() else {
                continue;
            };
            insert_row(conn, table_name, columns, row_id, cells_obj)?;
        }
    }

    conn.execute("DROP TABLE tinybase", [])?;
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

    fn seed_tinybase(conn: &Connection, blob: &str) {
        conn.execute("CREATE TABLE tinybase (id INTEGER PRIMARY KEY, data TEXT)", [])
            .unwrap();
        conn.execute("INSERT INTO tinybase (id, data) VALUES (1, ?1)", rusqlite::params![blob])
            .unwrap();
    }

    #[test]
    fn migrates_addresses_and_tags_then_drops_legacy_table() {
        let conn = open_schema();
        let blob = serde_json::json!([
            {
                "addresses": {
                    "a1": {"url": "https://a.example", "title": "A", "created_at": 1, "updated_at": 1},
                    "a2": {"url": "https://b.example", "title": "B", "created_at": 2, "updated_at": 2}
                },
                "tags": {
                    "t1": {"name": "work", "name_lower": "work", "slug": "work", "frequency": 0,
                           "last_used_at": 0, "frecency_score": 0.0, "created_at": 1, "updated_at": 1}
                }
            },
            {}
        ])
        .to_string();
        seed_tinybase(&conn, &blob);

        migrate_tinybase(&conn).unwrap();

        let addr_count: i64 = conn.query_row("SELECT COUNT(*) FROM addresses", [], |r| r.get(0)).unwrap();
        assert_eq!(addr_count, 2);
        let tag_count: i64 = conn.query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0)).unwrap();
        assert_eq!(tag_count, 1);

        let legacy_present: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='tinybase'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(legacy_present, 0);
    }

    #[test]
    fn second_boot_with_existing_rows_is_a_no_op() {
        let conn = open_schema();
        let blob = serde_json::json!([
            { "addresses": { "a1": {"url": "https://a.example"} } },
            {}
        ])
        .to_string();
        seed_tinybase(&conn, &blob);
        migrate_tinybase(&conn).unwrap();

        // Re-seed a legacy table (simulating a second boot against the same
        // on-disk file where `tinybase` was never actually dropped by some
        // external process) and confirm no duplicate insert / no crash.
        conn.execute("CREATE TABLE tinybase (id INTEGER PRIMARY KEY, data TEXT)", [])
            .unwrap();
        conn.execute(
            "INSERT INTO tinybase (id, data) VALUES (1, ?1)",
            rusqlite::params![blob],
        )
        .unwrap();

        migrate_tinybase(&conn).unwrap();
        let addr_count: i64 = conn.query_row("SELECT COUNT(*) FROM addresses", [], |r| r.get(0)).unwrap();
        assert_eq!(addr_count, 1);
    }
}
