//! Graph backend on embedded SQLite
//!
//! Memory entries, sessions, and code-structure elements are nodes; typed
//! edges connect them. One writer connection serializes all mutations while
//! a small pool of read-only connections serves concurrent reads (WAL mode).
//! Every SQLite call runs on the blocking thread pool.

pub mod relationship;
mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, Transaction, params, params_from_iter};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{BackendError, MemoryError, ValidationError};
use crate::memory::query::{MemoryQuery, rank_order};
use crate::memory::types::{EntryId, MemoryEntry, MemoryType};
use crate::storage::{BackendCapabilities, DeleteTarget, MemoryBackend, micros_to_datetime};

pub use relationship::{CodeLink, CodeNode, CodeNodeKind, NodeRef, RelationType, Relationship};

/// Reader connections opened when the caller asks for none
const DEFAULT_READERS: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str = "id, label, title, content, session_id, agent_id, \
     created_at, accessed_at, importance, metadata, expires_at";

const JOINED_ENTRY_COLUMNS: &str = "m.id, m.label, m.title, m.content, m.session_id, m.agent_id, \
     m.created_at, m.accessed_at, m.importance, m.metadata, m.expires_at";

const INSERT_EDGE: &str = "INSERT INTO edges (source_kind, source_id, target_kind, target_id,
                                              rel_type, relevance_score, context, created_at)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

/// Node/edge store on a single SQLite file.
pub struct GraphBackend {
    inner: Arc<Connections>,
}

struct Connections {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl Connections {
    fn open(path: &Path, readers: usize) -> Result<Self, BackendError> {
        let writer = Connection::open(path).map_err(|e| {
            BackendError::Unavailable(format!(
                "Failed to open graph database {}: {e}",
                path.display()
            ))
        })?;
        writer.busy_timeout(BUSY_TIMEOUT)?;
        writer.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::run_migrations(&writer)?;

        let count = if readers == 0 { DEFAULT_READERS } else { readers };
        let readers = (0..count)
            .map(|_| {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }
}

impl GraphBackend {
    /// Open (or create) the database at `path` with `readers` read-only
    /// connections, creating or upgrading the schema.
    pub async fn open(path: &Path, readers: usize) -> Result<Self, BackendError> {
        let owned = path.to_path_buf();
        let inner = tokio::task::spawn_blocking(move || Connections::open(&owned, readers)).await??;
        info!(
            "Graph backend ready at {} ({} readers)",
            path.display(),
            inner.readers.len()
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    async fn with_writer<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<BackendError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut conn = inner.writer.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| E::from(BackendError::from(e)))?
    }

    async fn with_reader<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Connection) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let slot = inner.next_reader.fetch_add(1, Ordering::Relaxed) % inner.readers.len();
            let conn = inner.readers[slot].lock();
            f(&conn)
        })
        .await?
    }

    /// Insert a code node, or refresh the summary of an existing one.
    /// Returns the node's row id for use in `NodeRef::Code`.
    pub async fn upsert_code_node(&self, node: &CodeNode) -> crate::error::Result<i64> {
        if node.path.trim().is_empty() {
            return Err(ValidationError::EmptyField("path").into());
        }
        if node.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("name").into());
        }

        let node = node.clone();
        let id = self
            .with_writer(move |conn| -> Result<i64, BackendError> {
                let id = conn.query_row(
                    "INSERT INTO code_nodes (kind, path, name, summary)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (kind, path, name)
                     DO UPDATE SET summary = COALESCE(excluded.summary, code_nodes.summary)
                     RETURNING id",
                    params![node.kind.as_str(), node.path, node.name, node.summary],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    /// Store a typed edge after checking both endpoints exist and fit the
    /// relationship type.
    pub async fn link(&self, relationship: &Relationship) -> crate::error::Result<i64> {
        relationship.validate()?;

        let rel = relationship.clone();
        self.with_writer(move |conn| -> Result<i64, MemoryError> {
            let tx = conn.transaction().map_err(BackendError::from)?;

            for node in [&rel.source, &rel.target] {
                if !node_exists(&tx, node)? {
                    return Err(ValidationError::InvalidRelationship(format!(
                        "unknown {} node {}",
                        node.kind_str(),
                        node.key()
                    ))
                    .into());
                }
            }
            if let (Some(expected), NodeRef::Code(code_id)) =
                (rel.rel_type.target_code_kind(), &rel.target)
            {
                let kind = code_node_kind(&tx, *code_id)?;
                if kind != Some(expected) {
                    return Err(ValidationError::InvalidRelationship(format!(
                        "{} must target a {} node",
                        rel.rel_type,
                        expected.as_str()
                    ))
                    .into());
                }
            }

            insert_edge(&tx, &rel)?;
            let id = tx.last_insert_rowid();
            tx.commit().map_err(BackendError::from)?;
            Ok(id)
        })
        .await
    }

    /// Outgoing edges of `node`, oldest first.
    pub async fn relationships_from(
        &self,
        node: &NodeRef,
    ) -> Result<Vec<Relationship>, BackendError> {
        let kind = node.kind_str();
        let key = node.key();
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, source_kind, source_id, target_kind, target_id, rel_type,
                        relevance_score, context, created_at
                 FROM edges WHERE source_kind = ?1 AND source_id = ?2
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![kind, key], EdgeRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(EdgeRow::into_relationship).collect()
        })
        .await
    }

    async fn entries_linked_to_code(
        &self,
        kind: CodeNodeKind,
        column: &'static str,
        value: &str,
    ) -> Result<Vec<MemoryEntry>, BackendError> {
        let value = value.to_string();
        let now = Utc::now().timestamp_micros();
        let mut entries = self
            .with_reader(move |conn| {
                let sql = format!(
                    "SELECT DISTINCT {JOINED_ENTRY_COLUMNS}
                     FROM memory_nodes m
                     JOIN edges e ON e.source_kind = 'memory' AND e.source_id = m.id
                     JOIN code_nodes c ON e.target_kind = 'code'
                                      AND c.id = CAST(e.target_id AS INTEGER)
                     WHERE c.kind = ?1 AND c.{column} = ?2
                       AND (m.label != 'Working' OR m.expires_at IS NULL OR m.expires_at > ?3)"
                );
                let params: [Value; 3] = [
                    Value::Text(kind.as_str().to_string()),
                    Value::Text(value),
                    Value::Integer(now),
                ];
                query_entries(conn, &sql, &params)
            })
            .await?;
        entries.sort_by(rank_order);
        Ok(entries)
    }
}

#[async_trait]
impl MemoryBackend for GraphBackend {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            graph_traversal: true,
            full_text_search: true,
        }
    }

    async fn write(&self, entry: &MemoryEntry) -> Result<EntryId, BackendError> {
        let entry = entry.clone();
        self.with_writer(move |conn| -> Result<EntryId, BackendError> {
            let metadata = serde_json::to_string(&entry.metadata)
                .map_err(|e| BackendError::Storage(format!("Failed to encode metadata: {e}")))?;
            let created = entry.created_at.timestamp_micros();

            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO memory_nodes
                     (id, label, title, content, session_id, agent_id,
                      created_at, accessed_at, importance, metadata, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (id) DO NOTHING",
                params![
                    entry.id.to_string(),
                    entry.memory_type().as_str(),
                    entry.title,
                    entry.content,
                    entry.session_id,
                    entry.agent_id,
                    created,
                    entry.accessed_at.timestamp_micros(),
                    entry.importance.map(i64::from),
                    metadata,
                    entry.expires_at.map(|t| t.timestamp_micros()),
                ],
            )?;

            if inserted == 0 {
                debug!("Entry {} already stored, skipping write", entry.id);
            } else {
                tx.execute(
                    "INSERT OR IGNORE INTO session_nodes (id, created_at) VALUES (?1, ?2)",
                    params![entry.session_id, created],
                )?;
                let edge = Relationship {
                    id: None,
                    source: NodeRef::Memory(entry.id),
                    target: NodeRef::Session(entry.session_id.clone()),
                    rel_type: RelationType::InSession,
                    relevance_score: 1.0,
                    context: None,
                    created_at: entry.created_at,
                };
                insert_edge(&tx, &edge)?;
            }
            tx.commit()?;
            Ok(entry.id)
        })
        .await
    }

    async fn read(&self, query: &MemoryQuery) -> Result<Vec<MemoryEntry>, BackendError> {
        let now = Utc::now();
        let (sql, params) = build_read_sql(query, now);
        let mut entries = self
            .with_reader(move |conn| query_entries(conn, &sql, &params))
            .await?;

        entries.retain(|e| query.matches(e, now));
        entries.sort_by(rank_order);
        entries.truncate(query.limit);
        Ok(entries)
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<usize, BackendError> {
        let (condition, params): (&'static str, Vec<Value>) = match target {
            DeleteTarget::Entry(id) => ("id = ?", vec![Value::Text(id.to_string())]),
            DeleteTarget::Session(session_id) => {
                ("session_id = ?", vec![Value::Text(session_id.clone())])
            }
            DeleteTarget::WorkingMemory(session_id) => (
                "session_id = ? AND label = 'Working'",
                vec![Value::Text(session_id.clone())],
            ),
            DeleteTarget::ExpiredBefore(at) => (
                "label = 'Working' AND expires_at IS NOT NULL AND expires_at <= ?",
                vec![Value::Integer(at.timestamp_micros())],
            ),
        };

        self.with_writer(move |conn| -> Result<usize, BackendError> {
            let tx = conn.transaction()?;
            // Edges go first; session and code nodes are left in place.
            tx.execute(
                &format!(
                    "DELETE FROM edges WHERE source_kind = 'memory'
                       AND source_id IN (SELECT id FROM memory_nodes WHERE {condition})"
                ),
                params_from_iter(params.iter()),
            )?;
            tx.execute(
                &format!(
                    "DELETE FROM edges WHERE target_kind = 'memory'
                       AND target_id IN (SELECT id FROM memory_nodes WHERE {condition})"
                ),
                params_from_iter(params.iter()),
            )?;
            let removed = tx.execute(
                &format!("DELETE FROM memory_nodes WHERE {condition}"),
                params_from_iter(params.iter()),
            )?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn touch(&self, ids: &[EntryId], at: DateTime<Utc>) -> Result<(), BackendError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let at = at.timestamp_micros();
        self.with_writer(move |conn| -> Result<(), BackendError> {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare_cached("UPDATE memory_nodes SET accessed_at = ?1 WHERE id = ?2")?;
                for id in &ids {
                    stmt.execute(params![at, id])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: EntryId) -> Result<Option<MemoryEntry>, BackendError> {
        self.with_reader(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM memory_nodes WHERE id = ?1"),
                    params![id.to_string()],
                    EntryRow::from_row,
                )
                .optional()?;
            row.map(EntryRow::into_entry).transpose()
        })
        .await
    }

    async fn count(&self) -> Result<usize, BackendError> {
        self.with_reader(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_nodes", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn schema_version(&self) -> Result<u32, BackendError> {
        self.with_reader(|conn| schema::schema_version(conn)).await
    }

    async fn code_context(
        &self,
        ids: &[EntryId],
    ) -> Result<HashMap<EntryId, Vec<CodeLink>>, BackendError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = ids.iter().map(Uuid::to_string).collect();

        self.with_reader(move |conn| {
            let placeholders = vec!["?"; keys.len()].join(", ");
            let sql = format!(
                "SELECT e.source_id, e.rel_type, e.relevance_score, e.context,
                        c.kind, c.path, c.name, c.summary
                 FROM edges e
                 JOIN code_nodes c ON e.target_kind = 'code'
                                  AND c.id = CAST(e.target_id AS INTEGER)
                 WHERE e.source_kind = 'memory' AND e.source_id IN ({placeholders})
                 ORDER BY e.source_id, e.relevance_score DESC, e.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(keys.iter()), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut links: HashMap<EntryId, Vec<CodeLink>> = HashMap::new();
            for (source, rel_type, score, context, kind, path, name, summary) in rows {
                let entry_id = Uuid::parse_str(&source)
                    .map_err(|e| BackendError::Corrupt(format!("Invalid entry id '{source}': {e}")))?;
                let link = CodeLink {
                    entry_id,
                    relation: rel_type.parse().map_err(BackendError::Corrupt)?,
                    node: CodeNode {
                        kind: kind.parse().map_err(BackendError::Corrupt)?,
                        path,
                        name,
                        summary,
                    },
                    relevance_score: score as f32,
                    context,
                };
                links.entry(entry_id).or_default().push(link);
            }
            Ok(links)
        })
        .await
    }

    async fn entries_linked_to_file(&self, path: &str) -> Result<Vec<MemoryEntry>, BackendError> {
        self.entries_linked_to_code(CodeNodeKind::File, "path", path)
            .await
    }

    async fn entries_linked_to_function(
        &self,
        name: &str,
    ) -> Result<Vec<MemoryEntry>, BackendError> {
        self.entries_linked_to_code(CodeNodeKind::Function, "name", name)
            .await
    }
}

/// Escape `%`, `_`, and the escape character itself for `LIKE … ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// SQL and bound parameters for a `read`. SQLite's `LIKE` folds ASCII case
/// only, so a non-ASCII search is left to the in-process filter and the
/// limit is applied after it.
fn build_read_sql(query: &MemoryQuery, now: DateTime<Utc>) -> (String, Vec<Value>) {
    let mut sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM memory_nodes
         WHERE (label != 'Working' OR expires_at IS NULL OR expires_at > ?)"
    );
    let mut params = vec![Value::Integer(now.timestamp_micros())];
    let mut push_limit = true;

    if let Some(ref needle) = query.content_search {
        if needle.is_ascii() {
            sql.push_str(" AND (title LIKE ? ESCAPE '\\' OR content LIKE ? ESCAPE '\\')");
            let pattern = format!("%{}%", escape_like(needle));
            params.push(Value::Text(pattern.clone()));
            params.push(Value::Text(pattern));
        } else {
            push_limit = false;
        }
    }
    if let Some(ref session_id) = query.session_id {
        sql.push_str(" AND session_id = ?");
        params.push(Value::Text(session_id.clone()));
    }
    if let Some(ref agent_id) = query.agent_id {
        sql.push_str(" AND agent_id = ?");
        params.push(Value::Text(agent_id.clone()));
    }
    if let Some(memory_type) = query.memory_type {
        sql.push_str(" AND label = ?");
        params.push(Value::Text(memory_type.as_str().to_string()));
    }
    if let Some(min) = query.min_importance {
        sql.push_str(" AND importance >= ?");
        params.push(Value::Integer(i64::from(min)));
    }
    if let Some(range) = query.time_range {
        if let Some(start) = range.start {
            sql.push_str(" AND created_at >= ?");
            params.push(Value::Integer(start.timestamp_micros()));
        }
        if let Some(end) = range.end {
            sql.push_str(" AND created_at < ?");
            params.push(Value::Integer(end.timestamp_micros()));
        }
    }

    sql.push_str(" ORDER BY COALESCE(importance, 0) DESC, created_at DESC, id ASC");
    if push_limit {
        sql.push_str(" LIMIT ?");
        params.push(Value::Integer(query.limit as i64));
    }

    (sql, params)
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<MemoryEntry>, BackendError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), EntryRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(EntryRow::into_entry).collect()
}

fn insert_edge(tx: &Transaction<'_>, rel: &Relationship) -> Result<(), BackendError> {
    tx.execute(
        INSERT_EDGE,
        params![
            rel.source.kind_str(),
            rel.source.key(),
            rel.target.kind_str(),
            rel.target.key(),
            rel.rel_type.as_str(),
            f64::from(rel.relevance_score),
            rel.context,
            rel.created_at.timestamp_micros(),
        ],
    )?;
    Ok(())
}

fn node_exists(tx: &Transaction<'_>, node: &NodeRef) -> Result<bool, BackendError> {
    let sql = match node {
        NodeRef::Memory(_) => "SELECT 1 FROM memory_nodes WHERE id = ?1",
        NodeRef::Session(_) => "SELECT 1 FROM session_nodes WHERE id = ?1",
        NodeRef::Code(_) => "SELECT 1 FROM code_nodes WHERE CAST(id AS TEXT) = ?1",
    };
    let found = tx
        .query_row(sql, params![node.key()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn code_node_kind(tx: &Transaction<'_>, id: i64) -> Result<Option<CodeNodeKind>, BackendError> {
    let kind: Option<String> = tx
        .query_row("SELECT kind FROM code_nodes WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    kind.map(|k| k.parse().map_err(BackendError::Corrupt))
        .transpose()
}

/// Raw `memory_nodes` columns, decoded outside the rusqlite row callback so
/// conversion failures surface as `Corrupt`.
struct EntryRow {
    id: String,
    label: String,
    title: String,
    content: String,
    session_id: String,
    agent_id: String,
    created_at: i64,
    accessed_at: i64,
    importance: Option<i64>,
    metadata: String,
    expires_at: Option<i64>,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            session_id: row.get(4)?,
            agent_id: row.get(5)?,
            created_at: row.get(6)?,
            accessed_at: row.get(7)?,
            importance: row.get(8)?,
            metadata: row.get(9)?,
            expires_at: row.get(10)?,
        })
    }

    fn into_entry(self) -> Result<MemoryEntry, BackendError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| BackendError::Corrupt(format!("Failed to parse UUID: {e}")))?;
        let memory_type = self
            .label
            .parse::<MemoryType>()
            .map_err(BackendError::Corrupt)?;
        let importance = self
            .importance
            .map(|raw| {
                u8::try_from(raw)
                    .map_err(|_| BackendError::Corrupt(format!("Invalid importance: {raw}")))
            })
            .transpose()?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| BackendError::Corrupt(format!("Failed to decode metadata: {e}")))?;
        let expires_at = self
            .expires_at
            .map(|t| micros_to_datetime(t, "expires_at"))
            .transpose()?;

        Ok(MemoryEntry::from_parts(
            id,
            memory_type,
            self.title,
            self.content,
            self.session_id,
            self.agent_id,
            micros_to_datetime(self.created_at, "created_at")?,
            micros_to_datetime(self.accessed_at, "accessed_at")?,
            importance,
            metadata,
            expires_at,
        ))
    }
}

struct EdgeRow {
    id: i64,
    source_kind: String,
    source_id: String,
    target_kind: String,
    target_id: String,
    rel_type: String,
    relevance_score: f64,
    context: Option<String>,
    created_at: i64,
}

impl EdgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_kind: row.get(1)?,
            source_id: row.get(2)?,
            target_kind: row.get(3)?,
            target_id: row.get(4)?,
            rel_type: row.get(5)?,
            relevance_score: row.get(6)?,
            context: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_relationship(self) -> Result<Relationship, BackendError> {
        Ok(Relationship {
            id: Some(self.id),
            source: NodeRef::from_columns(&self.source_kind, &self.source_id)
                .map_err(BackendError::Corrupt)?,
            target: NodeRef::from_columns(&self.target_kind, &self.target_id)
                .map_err(BackendError::Corrupt)?,
            rel_type: self.rel_type.parse().map_err(BackendError::Corrupt)?,
            relevance_score: self.relevance_score as f32,
            context: self.context,
            created_at: micros_to_datetime(self.created_at, "created_at")?,
        })
    }
}
