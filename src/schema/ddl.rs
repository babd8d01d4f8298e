//! Table and index DDL (spec §4.2). Every statement is idempotent
//! (`CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS`) so the
//! open-time sequence can run unconditionally on every boot.

/// `items`, `item_tags`, `tags`, `visits`, `settings`, `migrations` are the
/// forward-looking, item-centric tables (spec §3, §9 Design Notes).
const CORE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id TEXT PRIMARY KEY,
        type TEXT NOT NULL,
        content TEXT,
        mime_type TEXT NOT NULL DEFAULT '',
        metadata TEXT NOT NULL DEFAULT '{}',
        sync_id TEXT NOT NULL DEFAULT '',
        sync_source TEXT NOT NULL DEFAULT '',
        synced_at INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        deleted_at INTEGER NOT NULL DEFAULT 0,
        starred INTEGER NOT NULL DEFAULT 0,
        archived INTEGER NOT NULL DEFAULT 0,
        visit_count INTEGER NOT NULL DEFAULT 0,
        last_visit_at INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        name_lower TEXT NOT NULL,
        slug TEXT NOT NULL,
        color TEXT,
        parent_id TEXT,
        frequency INTEGER NOT NULL DEFAULT 0,
        last_used_at INTEGER NOT NULL DEFAULT 0,
        frecency_score REAL NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(name_lower)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS item_tags (
        id TEXT PRIMARY KEY,
        item_id TEXT NOT NULL,
        tag_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(item_id, tag_id)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS visits (
        id TEXT PRIMARY KEY,
        item_id TEXT NOT NULL,
        visited_at INTEGER NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}'
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        extension_id TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (extension_id, key)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS migrations (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        completed_at INTEGER NOT NULL DEFAULT 0
    )"#,
];

/// Legacy tables (spec §4.2, §9 Design Notes): retained only as a
/// migration destination for the TinyBase blob import. Nothing in the
/// item-centric datastore service reads or writes these.
const LEGACY_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS addresses (
        id TEXT PRIMARY KEY,
        url TEXT,
        title TEXT,
        created_at INTEGER,
        updated_at INTEGER
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS content (
        id TEXT PRIMARY KEY,
        address_id TEXT,
        body TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS address_tags (
        id TEXT PRIMARY KEY,
        address_id TEXT,
        tag_id TEXT,
        UNIQUE(address_id, tag_id)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS blobs (
        id TEXT PRIMARY KEY,
        data TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS scripts_data (
        id TEXT PRIMARY KEY,
        script_id TEXT,
        data TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS feeds (
        id TEXT PRIMARY KEY,
        url TEXT,
        title TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS extensions (
        id TEXT PRIMARY KEY,
        name TEXT,
        enabled INTEGER NOT NULL DEFAULT 1
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS extension_settings (
        id TEXT PRIMARY KEY,
        extension_id TEXT,
        key TEXT,
        value TEXT
    )"#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_items_type ON items(type)",
    "CREATE INDEX IF NOT EXISTS idx_items_updated_at ON items(updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_items_sync_id ON items(sync_id)",
    "CREATE INDEX IF NOT EXISTS idx_item_tags_tag_id ON item_tags(tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_address_tags_address_id ON address_tags(address_id)",
    "CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(name_lower)",
    "CREATE INDEX IF NOT EXISTS idx_tags_frecency ON tags(frecency_score)",
    "CREATE INDEX IF NOT EXISTS idx_extensions_enabled ON extensions(enabled)",
];

/// Every destination table the TinyBase migration is allowed to write to,
/// paired with its column list in insertion order (spec §4.2: "insert
/// every row via INSERT OR IGNORE using the row id plus its columns").
pub fn known_destination_tables() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        (
            "items",
            &[
                "id", "type", "content", "mime_type", "metadata", "sync_id", "sync_source",
                "synced_at", "created_at", "updated_at", "deleted_at", "starred", "archived",
                "visit_count", "last_visit_at",
            ],
        ),
        (
            "tags",
            &[
                "id",
                "name",
                "name_lower",
                "slug",
                "color",
                "parent_id",
                "frequency",
                "last_used_at",
                "frecency_score",
                "created_at",
                "updated_at",
            ],
        ),
        ("item_tags", &["id", "item_id", "tag_id", "created_at"]),
        ("visits", &["id", "item_id", "visited_at", "metadata"]),
        (
            "settings",
            &["extension_id", "key", "value", "updated_at"],
        ),
        ("addresses", &["id", "url", "title", "created_at", "updated_at"]),
        ("content", &["id", "address_id", "body"]),
        ("address_tags", &["id", "address_id", "tag_id"]),
        ("blobs", &["id", "data"]),
        ("scripts_data", &["id", "script_id", "data"]),
        ("feeds", &["id", "url", "title"]),
        ("extensions", &["id", "name", "enabled"]),
        (
            "extension_settings",
            &["id", "extension_id", "key", "value"],
        ),
    ]
}

pub fn all_ddl_statements() -> impl Iterator<Item = &'static str> {
    CORE_TABLES
        .iter()
        .chain(LEGACY_TABLES.iter())
        .chain(INDEXES.iter())
        .copied()
}
