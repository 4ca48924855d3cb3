//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: survey tables
    r#"
    -- ============================================
    -- Catalog and participants
    -- ============================================

    CREATE TABLE IF NOT EXISTS users (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL,
        password         TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS videos (
        seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
        url                 TEXT NOT NULL UNIQUE,
        channel_name        TEXT,
        channel_profile_url TEXT,
        description         TEXT,
        active              INTEGER NOT NULL DEFAULT 1
    );

    -- ============================================
    -- Interaction stores
    -- ============================================

    CREATE TABLE IF NOT EXISTS events (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id          TEXT NOT NULL,
        video_id         TEXT NOT NULL,
        ts               TEXT NOT NULL,
        kind             TEXT NOT NULL,
        session_id       TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS activity (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id              TEXT NOT NULL,
        video_id             TEXT NOT NULL,
        liked                INTEGER NOT NULL DEFAULT 0,
        disliked             INTEGER NOT NULL DEFAULT 0,
        shared               INTEGER NOT NULL DEFAULT 0,
        not_interested       INTEGER NOT NULL DEFAULT 0,
        channel_no_recommend INTEGER NOT NULL DEFAULT 0,
        reported             INTEGER NOT NULL DEFAULT 0,
        subscribed           INTEGER NOT NULL DEFAULT 0,

        UNIQUE(user_id, video_id)
    );

    CREATE TABLE IF NOT EXISTS last_watched (
        user_id          TEXT PRIMARY KEY,
        video_id         TEXT
    );

    CREATE TABLE IF NOT EXISTS comments (
        seq              INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id         TEXT NOT NULL,
        comment_id       TEXT NOT NULL UNIQUE,
        parent_id        TEXT,
        author           TEXT,
        text             TEXT,
        published_at     TEXT,
        like_count       INTEGER,
        avatar_url       TEXT
    );

    -- ============================================
    -- Indexes
    -- ============================================

    CREATE INDEX IF NOT EXISTS idx_events_pair ON events(user_id, video_id);
    CREATE INDEX IF NOT EXISTS idx_comments_video_parent ON comments(video_id, parent_id);
    CREATE INDEX IF NOT EXISTS idx_comments_published ON comments(video_id, published_at DESC);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
