//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the archive database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track batch runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Terminal outcome of every account in a run
CREATE TABLE IF NOT EXISTS run_outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    account TEXT NOT NULL,
    outcome TEXT NOT NULL,
    stop_reason TEXT,
    articles_stored INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_run_outcomes_run ON run_outcomes(run_id);

-- Public accounts, unique per platform
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    name TEXT NOT NULL,
    external_id TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(platform, name)
);

-- Archived articles, unique by url
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    title TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    publish_time TEXT NOT NULL,
    publish_timestamp INTEGER NOT NULL,
    content TEXT,
    summary TEXT,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_account ON articles(account_id);
CREATE INDEX IF NOT EXISTS idx_articles_publish ON articles(publish_timestamp);

-- Resumable walk progress
CREATE TABLE IF NOT EXISTS checkpoints (
    platform TEXT NOT NULL,
    account TEXT NOT NULL,
    external_id TEXT,
    pages_completed INTEGER NOT NULL DEFAULT 0,
    earliest_publish_timestamp INTEGER,
    stop_reason TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (platform, account)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
