//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so bootstrap
//! runs on every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS queue (
    id              TEXT PRIMARY KEY NOT NULL,
    segment         TEXT NOT NULL UNIQUE,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS queue_item (
    id              TEXT PRIMARY KEY NOT NULL,
    source_id       TEXT NOT NULL UNIQUE,
    segment         TEXT NOT NULL,
    status_code     TEXT NOT NULL,
    priority        INTEGER NOT NULL DEFAULT 50,
    version         INTEGER NOT NULL CHECK(version >= 1),
    assigned_agent  TEXT,
    payload         TEXT NOT NULL,
    metadata        TEXT NOT NULL,
    handoff_plan    TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS queue_item_state (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id         TEXT NOT NULL REFERENCES queue_item(id),
    version         INTEGER NOT NULL,
    status_code     TEXT NOT NULL,
    segment         TEXT NOT NULL,
    actor           TEXT,
    note            TEXT,
    created_at      TEXT NOT NULL,
    UNIQUE(item_id, version)
);

CREATE TABLE IF NOT EXISTS queue_lock (
    id              TEXT PRIMARY KEY NOT NULL,
    scope           TEXT NOT NULL CHECK(scope IN ('queue','item')),
    target_id       TEXT NOT NULL,
    holder          TEXT NOT NULL,
    token_hash      TEXT NOT NULL,
    acquired_at     TEXT NOT NULL,
    expires_at      TEXT NOT NULL,
    UNIQUE(scope, target_id)
);

CREATE TABLE IF NOT EXISTS agent (
    id              TEXT PRIMARY KEY NOT NULL,
    role_key        TEXT NOT NULL,
    display_name    TEXT NOT NULL,
    contact         TEXT,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agent_preference (
    role_key                TEXT PRIMARY KEY NOT NULL,
    primary_segments        TEXT NOT NULL,
    fallback_segments       TEXT NOT NULL,
    pickup_statuses         TEXT NOT NULL,
    active_statuses         TEXT NOT NULL,
    accept_status           TEXT NOT NULL,
    return_status           TEXT NOT NULL,
    max_in_progress_minutes INTEGER NOT NULL CHECK(max_in_progress_minutes > 0),
    updated_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_item_segment_created ON queue_item(segment, created_at);
CREATE INDEX IF NOT EXISTS idx_item_state_item ON queue_item_state(item_id, version);
CREATE INDEX IF NOT EXISTS idx_lock_expires ON queue_lock(expires_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_lock_token ON queue_lock(token_hash);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
