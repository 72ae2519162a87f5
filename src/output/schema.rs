//! Database schema definitions
//!
//! This module contains the SQL schema for the SQLite export.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    parents_fetched INTEGER NOT NULL DEFAULT 0,
    replies_fetched INTEGER NOT NULL DEFAULT 0,
    failures INTEGER NOT NULL DEFAULT 0
);

-- Thread-starting messages
CREATE TABLE IF NOT EXISTS parents (
    identity TEXT PRIMARY KEY,
    position TEXT NOT NULL,
    reply_count INTEGER NOT NULL,
    permalink TEXT,
    payload TEXT NOT NULL
);

-- Messages nested under a parent
CREATE TABLE IF NOT EXISTS replies (
    parent_identity TEXT NOT NULL,
    position TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (parent_identity, position)
);

CREATE INDEX IF NOT EXISTS idx_replies_parent ON replies(parent_identity);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
