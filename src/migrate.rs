//! Library schema.
//!
//! Search runs against `*_folded` columns holding lowercased copies of the
//! searchable text. SQLite's `lower()` only folds ASCII, so folding happens
//! in Rust at import time and again on every query value.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS libraries (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        library_id INTEGER NOT NULL,
        key TEXT NOT NULL,
        kind TEXT NOT NULL,
        parent_key TEXT,
        title TEXT,
        title_folded TEXT NOT NULL DEFAULT '',
        date TEXT,
        year TEXT NOT NULL DEFAULT '',
        citation_key TEXT,
        note TEXT,
        note_folded TEXT NOT NULL DEFAULT '',
        path TEXT,
        csl_json TEXT NOT NULL DEFAULT '{}',
        fields_folded TEXT NOT NULL DEFAULT '',
        date_added INTEGER NOT NULL,
        UNIQUE(library_id, key),
        FOREIGN KEY (library_id) REFERENCES libraries(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS creators (
        item_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        last_name TEXT NOT NULL,
        first_name TEXT NOT NULL,
        name_folded TEXT NOT NULL,
        PRIMARY KEY (item_id, position),
        FOREIGN KEY (item_id) REFERENCES items(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        item_id INTEGER NOT NULL,
        tag TEXT NOT NULL,
        tag_folded TEXT NOT NULL,
        PRIMARY KEY (item_id, tag),
        FOREIGN KEY (item_id) REFERENCES items(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        library_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        parent_id INTEGER,
        FOREIGN KEY (library_id) REFERENCES libraries(id),
        FOREIGN KEY (parent_id) REFERENCES collections(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collection_items (
        collection_id INTEGER NOT NULL,
        item_id INTEGER NOT NULL,
        PRIMARY KEY (collection_id, item_id),
        FOREIGN KEY (collection_id) REFERENCES collections(id),
        FOREIGN KEY (item_id) REFERENCES items(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS selection (
        position INTEGER PRIMARY KEY,
        item_id INTEGER NOT NULL,
        FOREIGN KEY (item_id) REFERENCES items(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_library ON items(library_id)",
    "CREATE INDEX IF NOT EXISTS idx_items_parent ON items(library_id, parent_key)",
    "CREATE INDEX IF NOT EXISTS idx_items_citation_key ON items(citation_key)",
    "CREATE INDEX IF NOT EXISTS idx_creators_item ON creators(item_id)",
    "CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag)",
    "CREATE INDEX IF NOT EXISTS idx_collections_name ON collections(name)",
];

/// Creates every table and index. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool, config.library.user_library_id).await?;
    pool.close().await;
    Ok(())
}

/// Applies the schema on an open pool and makes sure the personal library exists.
pub async fn apply_schema(pool: &SqlitePool, user_library_id: i64) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    sqlx::query("INSERT OR IGNORE INTO libraries (id, name) VALUES (?, 'My Library')")
        .bind(user_library_id)
        .execute(pool)
        .await?;

    Ok(())
}
