//! spec §8 scenario 6: a legacy `tinybase` blob is migrated into the
//! item-centric tables on first boot and is a no-op on the second.

use peek_datastore::SqliteBackend;
use rusqlite::Connection;
use tempfile::tempdir;

fn seed_legacy_tinybase_blob(path: &std::path::Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute("CREATE TABLE tinybase (data TEXT)", []).unwrap();

    let blob = serde_json::json!([
        {
            "addresses": {
                "addr1": {
                    "id": "addr1",
                    "url": "https://a.example",
                    "title": "A",
                    "created_at": 1000,
                    "updated_at": 1000
                }
            },
            "tags": {
                "tag1": {
                    "id": "tag1",
                    "name": "Work",
                    "name_lower": "work",
                    "slug": "work",
                    "frequency": 1,
                    "last_used_at": 1000,
                    "frecency_score": 1.0,
                    "created_at": 1000,
                    "updated_at": 1000
                }
            },
            "address_tags": {
                "at1": {
                    "id": "at1",
                    "address_id": "addr1",
                    "tag_id": "tag1"
                }
            }
        },
        {}
    ]);

    conn.execute(
        "INSERT INTO tinybase (data) VALUES (?1)",
        [blob.to_string()],
    )
    .unwrap();
}

fn row_count(path: &std::path::Path, table: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn first_boot_migrates_legacy_blob_second_boot_is_a_no_op() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.sqlite");
    seed_legacy_tinybase_blob(&path);

    {
        let _backend = SqliteBackend::open(&path).unwrap();
    }

    assert_eq!(row_count(&path, "addresses"), 1);
    assert_eq!(row_count(&path, "tags"), 1);
    assert_eq!(row_count(&path, "address_tags"), 1);

    let conn = Connection::open(&path).unwrap();
    let tinybase_gone: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tinybase'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(tinybase_gone, 0);
    drop(conn);

    {
        let _backend = SqliteBackend::open(&path).unwrap();
    }

    assert_eq!(row_count(&path, "addresses"), 1);
    assert_eq!(row_count(&path, "tags"), 1);
    assert_eq!(row_count(&path, "address_tags"), 1);
}
