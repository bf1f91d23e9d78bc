//! SQLite schema for the graph backend
//!
//! All DDL is `IF NOT EXISTS`, so running it against an existing database is
//! a no-op. `PRAGMA user_version` records the schema version.

use rusqlite::Connection;
use tracing::info;

use crate::error::BackendError;
use crate::storage::SCHEMA_VERSION;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memory_nodes (
        id TEXT PRIMARY KEY,
        label TEXT NOT NULL
            CHECK (label IN ('Episodic', 'Semantic', 'Procedural', 'Prospective', 'Working')),
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        session_id TEXT NOT NULL,
        agent_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        accessed_at INTEGER NOT NULL,
        importance INTEGER CHECK (importance IS NULL OR importance BETWEEN 0 AND 10),
        metadata TEXT NOT NULL DEFAULT '{}',
        expires_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_memory_nodes_session
        ON memory_nodes(session_id, label);
    CREATE INDEX IF NOT EXISTS idx_memory_nodes_created
        ON memory_nodes(created_at DESC);

    CREATE TABLE IF NOT EXISTS session_nodes (
        id TEXT PRIMARY KEY,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS code_nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL CHECK (kind IN ('File', 'Class', 'Function')),
        path TEXT NOT NULL,
        name TEXT NOT NULL,
        summary TEXT,
        UNIQUE (kind, path, name)
    );

    CREATE INDEX IF NOT EXISTS idx_code_nodes_name ON code_nodes(kind, name);

    CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_kind TEXT NOT NULL CHECK (source_kind IN ('memory', 'session', 'code')),
        source_id TEXT NOT NULL,
        target_kind TEXT NOT NULL CHECK (target_kind IN ('memory', 'session', 'code')),
        target_id TEXT NOT NULL,
        rel_type TEXT NOT NULL,
        relevance_score REAL NOT NULL DEFAULT 1.0
            CHECK (relevance_score >= 0.0 AND relevance_score <= 1.0),
        context TEXT,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_kind, source_id);
    CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_kind, target_id);
";

/// Bring the database to `SCHEMA_VERSION`. Refuses databases written by a
/// newer build.
pub(crate) fn run_migrations(conn: &Connection) -> Result<(), BackendError> {
    let found: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| BackendError::Schema(format!("Failed to read schema version: {e}")))?;

    if found > SCHEMA_VERSION {
        return Err(BackendError::Schema(format!(
            "Store schema version {found} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    conn.execute_batch(SCHEMA)
        .map_err(|e| BackendError::Schema(format!("Failed to create graph schema: {e}")))?;

    if found < SCHEMA_VERSION {
        if found == 0 {
            info!("Created graph schema v{}", SCHEMA_VERSION);
        } else {
            info!("Upgraded graph schema from v{} to v{}", found, SCHEMA_VERSION);
        }
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| BackendError::Schema(format!("Failed to record schema version: {e}")))?;
    }

    Ok(())
}

pub(crate) fn schema_version(conn: &Connection) -> Result<u32, BackendError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}
