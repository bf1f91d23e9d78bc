//! Relational backend on LanceDB
//!
//! One `memories` table holds every entry; an `engine_meta` key/value table
//! records the schema version. Writes are serialized through a single lock,
//! reads run concurrently against the latest committed table version.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arrow_array::{Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::index::Index;
use lancedb::index::scalar::BTreeIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::OptimizeAction;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BackendError;
use crate::memory::query::{MemoryQuery, rank_order};
use crate::memory::types::{EntryId, MemoryEntry, MemoryType};
use crate::storage::filter::LanceFilter;
use crate::storage::{
    BackendCapabilities, DeleteTarget, MemoryBackend, SCHEMA_VERSION, micros_to_datetime,
};

const MEMORIES_TABLE: &str = "memories";
const META_TABLE: &str = "engine_meta";
const SCHEMA_VERSION_KEY: &str = "schema_version";
const INDEXED_COLUMNS: [&str; 3] = ["session_id", "memory_type", "created_at"];
/// Every add or update commits a new fragment; fold them together this often.
const COMPACT_EVERY: usize = 64;
/// Headroom over the counted matches when sizing a scan.
const SCAN_SLACK: usize = 16;

/// Entry store on a LanceDB directory.
pub struct RelationalBackend {
    connection: Connection,
    memories: Table,
    meta: Table,
    write_lock: Mutex<()>,
    indexed: AtomicBool,
    mutations: AtomicUsize,
}

impl RelationalBackend {
    /// Open (or create) the store at `path`, bringing its schema up to the
    /// current version.
    pub async fn open(path: &Path) -> Result<Self, BackendError> {
        let uri = path
            .to_str()
            .ok_or_else(|| BackendError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| BackendError::Unavailable(format!("Failed to connect to LanceDB: {e}")))?;

        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to list tables: {e}")))?;

        let memories = if names.iter().any(|n| n == MEMORIES_TABLE) {
            open_table(&connection, MEMORIES_TABLE).await?
        } else {
            info!("Creating {} table", MEMORIES_TABLE);
            create_table(&connection, MEMORIES_TABLE, memories_schema()).await?
        };

        let meta = if names.iter().any(|n| n == META_TABLE) {
            open_table(&connection, META_TABLE).await?
        } else {
            create_table(&connection, META_TABLE, meta_schema()).await?
        };

        let backend = Self {
            connection,
            memories,
            meta,
            write_lock: Mutex::new(()),
            indexed: AtomicBool::new(false),
            mutations: AtomicUsize::new(0),
        };
        backend.migrate().await?;
        backend.ensure_indices().await;
        Ok(backend)
    }

    /// Record the current schema version, refusing stores written by a newer
    /// build.
    async fn migrate(&self) -> Result<(), BackendError> {
        let _guard = self.write_lock.lock().await;

        match self.read_schema_version().await? {
            Some(found) if found > SCHEMA_VERSION => Err(BackendError::Schema(format!(
                "Store schema version {found} is newer than supported version {SCHEMA_VERSION}"
            ))),
            Some(found) if found == SCHEMA_VERSION => Ok(()),
            found => {
                if let Some(old) = found {
                    info!("Upgrading relational schema from v{} to v{}", old, SCHEMA_VERSION);
                    self.meta
                        .delete(&format!("key = '{SCHEMA_VERSION_KEY}'"))
                        .await
                        .map_err(|e| {
                            BackendError::Schema(format!("Failed to clear schema version: {e}"))
                        })?;
                }
                let schema = meta_schema();
                let batch = RecordBatch::try_new(
                    schema.clone(),
                    vec![
                        Arc::new(StringArray::from(vec![SCHEMA_VERSION_KEY])),
                        Arc::new(StringArray::from(vec![SCHEMA_VERSION.to_string()])),
                    ],
                )
                .map_err(|e| BackendError::Schema(format!("Failed to build meta batch: {e}")))?;
                let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
                self.meta
                    .add(Box::new(batches))
                    .execute()
                    .await
                    .map_err(|e| {
                        BackendError::Schema(format!("Failed to record schema version: {e}"))
                    })?;
                Ok(())
            }
        }
    }

    /// Build B-tree indices on the filter columns. Scalar indices cannot be
    /// trained on an empty table, so this is a no-op until rows exist.
    async fn ensure_indices(&self) {
        if self.indexed.load(Ordering::Acquire) {
            return;
        }
        match self.memories.count_rows(None).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to count rows before indexing: {}", e);
                return;
            }
        }

        let existing: Vec<String> = match self.memories.list_indices().await {
            Ok(indices) => indices.into_iter().flat_map(|i| i.columns).collect(),
            Err(e) => {
                warn!("Failed to list indices: {}", e);
                return;
            }
        };

        for column in INDEXED_COLUMNS {
            if existing.iter().any(|c| c == column) {
                continue;
            }
            if let Err(e) = self
                .memories
                .create_index(&[column], Index::BTree(BTreeIndexBuilder::default()))
                .execute()
                .await
            {
                // Queries stay correct without the index, only slower.
                warn!("Failed to create index on {}: {}", column, e);
                return;
            }
            debug!("Created B-tree index on {}", column);
        }
        self.indexed.store(true, Ordering::Release);
    }

    async fn read_schema_version(&self) -> Result<Option<u32>, BackendError> {
        let batches: Vec<RecordBatch> = self
            .meta
            .query()
            .only_if(format!("key = '{SCHEMA_VERSION_KEY}'"))
            .limit(1)
            .execute()
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to query schema version: {e}")))?
            .try_collect()
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to collect schema version: {e}")))?;

        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let values = string_column(batch, "value")?;
            let version = values.value(0).parse::<u32>().map_err(|e| {
                BackendError::Corrupt(format!("Invalid schema version '{}': {e}", values.value(0)))
            })?;
            return Ok(Some(version));
        }
        Ok(None)
    }

    /// Fetch every row matching `filter`, in storage order.
    ///
    /// Plain scans take an explicit limit. Each query reads one table
    /// version, but a touch or write may commit between the count and the
    /// query, so the limit is widened until a page comes back short.
    async fn scan(&self, filter: &LanceFilter) -> Result<Vec<MemoryEntry>, BackendError> {
        let clause = filter.to_sql_clause();

        let matching = self
            .memories
            .count_rows(clause.clone())
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to count rows: {e}")))?;
        let mut limit = matching + SCAN_SLACK;

        loop {
            let mut query = self.memories.query().limit(limit);
            if let Some(sql) = &clause {
                query = query.only_if(sql.clone());
            }

            let batches: Vec<RecordBatch> = query
                .execute()
                .await
                .map_err(|e| BackendError::Storage(format!("Failed to execute query: {e}")))?
                .try_collect()
                .await
                .map_err(|e| {
                    BackendError::Storage(format!("Failed to collect query results: {e}"))
                })?;

            let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
            if rows >= limit {
                debug!("Scan filled its limit of {}, widening", limit);
                limit *= 2;
                continue;
            }

            let mut entries = Vec::with_capacity(rows);
            for batch in &batches {
                for row in 0..batch.num_rows() {
                    entries.push(batch_to_entry(batch, row)?);
                }
            }
            return Ok(entries);
        }
    }

    /// Count a committed add or update and compact once enough fragments
    /// have piled up. Caller holds the write lock.
    async fn record_mutation(&self) {
        let pending = self.mutations.fetch_add(1, Ordering::AcqRel) + 1;
        if pending < COMPACT_EVERY {
            return;
        }
        self.mutations.store(0, Ordering::Release);

        // Reads stay correct on an uncompacted table, only slower.
        match self.memories.optimize(OptimizeAction::All).await {
            Ok(_) => debug!("Compacted {} table after {} mutations", MEMORIES_TABLE, pending),
            Err(e) => warn!("Failed to compact {} table: {}", MEMORIES_TABLE, e),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

#[async_trait]
impl MemoryBackend for RelationalBackend {
    fn name(&self) -> &'static str {
        "relational"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            graph_traversal: false,
            full_text_search: false,
        }
    }

    async fn write(&self, entry: &MemoryEntry) -> Result<EntryId, BackendError> {
        let _guard = self.write_lock.lock().await;

        let existing = self
            .memories
            .count_rows(LanceFilter::new().with_id(entry.id).to_sql_clause())
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to check for entry: {e}")))?;
        if existing > 0 {
            debug!("Entry {} already stored, skipping write", entry.id);
            return Ok(entry.id);
        }

        let schema = memories_schema();
        let batch = entries_to_batch(std::slice::from_ref(entry), schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.memories
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to insert entry: {e}")))?;

        self.ensure_indices().await;
        self.record_mutation().await;
        Ok(entry.id)
    }

    async fn read(&self, query: &MemoryQuery) -> Result<Vec<MemoryEntry>, BackendError> {
        let now = Utc::now();
        let filter = LanceFilter::from_query(query, now);

        let mut entries: Vec<MemoryEntry> = self
            .scan(&filter)
            .await?
            .into_iter()
            .filter(|e| query.matches(e, now))
            .collect();

        entries.sort_by(rank_order);
        entries.truncate(query.limit);
        Ok(entries)
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<usize, BackendError> {
        let filter = match target {
            DeleteTarget::Entry(id) => LanceFilter::new().with_id(*id),
            DeleteTarget::Session(session_id) => LanceFilter::new().with_session(session_id),
            DeleteTarget::WorkingMemory(session_id) => LanceFilter::new()
                .with_session(session_id)
                .with_memory_type(MemoryType::Working),
            DeleteTarget::ExpiredBefore(at) => LanceFilter::new().expired_working(*at),
        };
        let Some(clause) = filter.to_sql_clause() else {
            return Ok(0);
        };

        let _guard = self.write_lock.lock().await;

        let removed = self
            .memories
            .count_rows(Some(clause.clone()))
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to count rows: {e}")))?;
        if removed > 0 {
            self.memories
                .delete(&clause)
                .await
                .map_err(|e| BackendError::Storage(format!("Failed to delete entries: {e}")))?;
        }
        Ok(removed)
    }

    async fn touch(&self, ids: &[EntryId], at: DateTime<Utc>) -> Result<(), BackendError> {
        if ids.is_empty() {
            return Ok(());
        }
        let Some(clause) = LanceFilter::new().with_ids(ids).to_sql_clause() else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        self.memories
            .update()
            .only_if(clause)
            .column("accessed_at", at.timestamp_micros().to_string())
            .execute()
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to update accessed_at: {e}")))?;
        self.record_mutation().await;
        Ok(())
    }

    async fn get(&self, id: EntryId) -> Result<Option<MemoryEntry>, BackendError> {
        let entries = self.scan(&LanceFilter::new().with_id(id)).await?;
        Ok(entries.into_iter().next())
    }

    async fn count(&self) -> Result<usize, BackendError> {
        self.memories
            .count_rows(None)
            .await
            .map_err(|e| BackendError::Storage(format!("Failed to count entries: {e}")))
    }

    async fn schema_version(&self) -> Result<u32, BackendError> {
        self.read_schema_version()
            .await?
            .ok_or_else(|| BackendError::Schema("Schema version missing".to_string()))
    }
}

async fn open_table(connection: &Connection, name: &str) -> Result<Table, BackendError> {
    connection
        .open_table(name)
        .execute()
        .await
        .map_err(|e| BackendError::Storage(format!("Failed to open {name} table: {e}")))
}

async fn create_table(
    connection: &Connection,
    name: &str,
    schema: Arc<Schema>,
) -> Result<Table, BackendError> {
    let batch = RecordBatch::new_empty(schema.clone());
    let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

    connection
        .create_table(name, Box::new(batches))
        .execute()
        .await
        .map_err(|e| BackendError::Schema(format!("Failed to create {name} table: {e}")))
}

fn memories_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("memory_type", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("session_id", DataType::Utf8, false),
        Field::new("agent_id", DataType::Utf8, false),
        // Microseconds since the Unix epoch, UTC
        Field::new("created_at", DataType::Int64, false),
        Field::new("accessed_at", DataType::Int64, false),
        Field::new("importance", DataType::Int32, true),
        // JSON object of string values
        Field::new("metadata", DataType::Utf8, false),
        Field::new("expires_at", DataType::Int64, true),
    ]))
}

fn meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
    ]))
}

fn entries_to_batch(entries: &[MemoryEntry], schema: Arc<Schema>) -> Result<RecordBatch, BackendError> {
    let ids: Vec<String> = entries.iter().map(|e| e.id.to_string()).collect();
    let memory_types: Vec<&str> = entries.iter().map(|e| e.memory_type().as_str()).collect();
    let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
    let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
    let sessions: Vec<&str> = entries.iter().map(|e| e.session_id.as_str()).collect();
    let agents: Vec<&str> = entries.iter().map(|e| e.agent_id.as_str()).collect();
    let created_at: Vec<i64> = entries.iter().map(|e| e.created_at.timestamp_micros()).collect();
    let accessed_at: Vec<i64> = entries
        .iter()
        .map(|e| e.accessed_at.timestamp_micros())
        .collect();
    let importance: Vec<Option<i32>> = entries.iter().map(|e| e.importance.map(i32::from)).collect();
    let metadata = entries
        .iter()
        .map(|e| serde_json::to_string(&e.metadata))
        .collect::<Result<Vec<String>, _>>()
        .map_err(|e| BackendError::Storage(format!("Failed to encode metadata: {e}")))?;
    let expires_at: Vec<Option<i64>> = entries
        .iter()
        .map(|e| e.expires_at.map(|t| t.timestamp_micros()))
        .collect();

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(memory_types)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(sessions)),
            Arc::new(StringArray::from(agents)),
            Arc::new(Int64Array::from(created_at)),
            Arc::new(Int64Array::from(accessed_at)),
            Arc::new(Int32Array::from(importance)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(Int64Array::from(expires_at)),
        ],
    )
    .map_err(|e| BackendError::Storage(format!("Failed to create RecordBatch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, BackendError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| BackendError::Corrupt(format!("Failed to get {name} column")))
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, BackendError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| BackendError::Corrupt(format!("Failed to get {name} column")))
}

fn batch_to_entry(batch: &RecordBatch, row: usize) -> Result<MemoryEntry, BackendError> {
    let ids = string_column(batch, "id")?;
    let memory_types = string_column(batch, "memory_type")?;
    let titles = string_column(batch, "title")?;
    let contents = string_column(batch, "content")?;
    let sessions = string_column(batch, "session_id")?;
    let agents = string_column(batch, "agent_id")?;
    let created = int64_column(batch, "created_at")?;
    let accessed = int64_column(batch, "accessed_at")?;
    let importance = batch
        .column_by_name("importance")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| BackendError::Corrupt("Failed to get importance column".to_string()))?;
    let metadata = string_column(batch, "metadata")?;
    let expires = int64_column(batch, "expires_at")?;

    let id = Uuid::parse_str(ids.value(row))
        .map_err(|e| BackendError::Corrupt(format!("Failed to parse UUID: {e}")))?;
    let memory_type = memory_types
        .value(row)
        .parse::<MemoryType>()
        .map_err(BackendError::Corrupt)?;
    let importance = if importance.is_null(row) {
        None
    } else {
        let raw = importance.value(row);
        Some(
            u8::try_from(raw)
                .map_err(|_| BackendError::Corrupt(format!("Invalid importance: {raw}")))?,
        )
    };
    let metadata: BTreeMap<String, String> = serde_json::from_str(metadata.value(row))
        .map_err(|e| BackendError::Corrupt(format!("Failed to decode metadata: {e}")))?;
    let expires_at = if expires.is_null(row) {
        None
    } else {
        Some(micros_to_datetime(expires.value(row), "expires_at")?)
    };

    Ok(MemoryEntry::from_parts(
        id,
        memory_type,
        titles.value(row).to_string(),
        contents.value(row).to_string(),
        sessions.value(row).to_string(),
        agents.value(row).to_string(),
        micros_to_datetime(created.value(row), "created_at")?,
        micros_to_datetime(accessed.value(row), "accessed_at")?,
        importance,
        metadata,
        expires_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(memory_type: MemoryType, title: &str, session: &str) -> MemoryEntry {
        MemoryEntry::new(memory_type, title, format!("{title} body"), session, "agent-1")
    }

    async fn open_temp() -> (tempfile::TempDir, RelationalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = RelationalBackend::open(temp_dir.path()).await.unwrap();
        (temp_dir, backend)
    }

    #[tokio::test]
    async fn test_open_creates_tables_and_version() {
        let (_dir, backend) = open_temp().await;

        let names = backend.connection().table_names().execute().await.unwrap();
        assert!(names.contains(&MEMORIES_TABLE.to_string()));
        assert!(names.contains(&META_TABLE.to_string()));
        assert_eq!(backend.schema_version().await.unwrap(), SCHEMA_VERSION);
        assert_eq!(backend.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data_and_single_version_row() {
        let temp_dir = tempfile::tempdir().unwrap();
        let e = entry(MemoryType::Semantic, "Persisted", "s-1");
        {
            let backend = RelationalBackend::open(temp_dir.path()).await.unwrap();
            backend.write(&e).await.unwrap();
        }

        let backend = RelationalBackend::open(temp_dir.path()).await.unwrap();
        assert_eq!(backend.get(e.id).await.unwrap().unwrap().title, "Persisted");
        assert_eq!(backend.meta.count_rows(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_and_get_roundtrip() {
        let (_dir, backend) = open_temp().await;

        let mut metadata = BTreeMap::new();
        metadata.insert("ticket".to_string(), "OPS-12".to_string());
        let mut e = entry(MemoryType::Working, "Scratch", "s-1")
            .with_metadata(metadata)
            .with_expiry(Utc::now() + Duration::hours(1));
        e.importance = None;

        backend.write(&e).await.unwrap();
        let stored = backend.get(e.id).await.unwrap().unwrap();

        assert_eq!(stored.id, e.id);
        assert_eq!(stored.memory_type(), MemoryType::Working);
        assert_eq!(stored.metadata, e.metadata);
        assert_eq!(stored.importance, None);
        assert_eq!(
            stored.created_at.timestamp_micros(),
            e.created_at.timestamp_micros()
        );
        assert_eq!(
            stored.expires_at.map(|t| t.timestamp_micros()),
            e.expires_at.map(|t| t.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let (_dir, backend) = open_temp().await;
        let e = entry(MemoryType::Semantic, "Once", "s-1");

        backend.write(&e).await.unwrap();
        backend.write(&e).await.unwrap();

        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_ranks_and_limits() {
        let (_dir, backend) = open_temp().await;

        for (title, importance) in [("low", 2), ("high", 9), ("mid", 5)] {
            let mut e = entry(MemoryType::Semantic, title, "s-1");
            e.importance = Some(importance);
            backend.write(&e).await.unwrap();
        }

        let results = backend
            .read(&MemoryQuery::new().with_limit(2))
            .await
            .unwrap();
        let titles: Vec<&str> = results.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "mid"]);
    }

    #[tokio::test]
    async fn test_read_content_search_with_quotes() {
        let (_dir, backend) = open_temp().await;
        backend
            .write(&entry(MemoryType::Semantic, "O'Brien's cache notes", "s-1"))
            .await
            .unwrap();
        backend
            .write(&entry(MemoryType::Semantic, "Unrelated", "s-1"))
            .await
            .unwrap();

        let results = backend
            .read(&MemoryQuery::new().with_content_search("o'brien"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let results = backend
            .read(&MemoryQuery::new().with_session("s-1' OR '1'='1"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_read_hides_expired_working() {
        let (_dir, backend) = open_temp().await;
        let mut e = entry(MemoryType::Working, "Stale", "s-1");
        e.expires_at = Some(Utc::now() - Duration::seconds(1));
        backend.write(&e).await.unwrap();

        assert!(backend.read(&MemoryQuery::new()).await.unwrap().is_empty());
        assert_eq!(backend.count().await.unwrap(), 1);

        let purged = backend
            .delete(&DeleteTarget::ExpiredBefore(Utc::now()))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(backend.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_working_memory_only() {
        let (_dir, backend) = open_temp().await;
        backend
            .write(&entry(MemoryType::Working, "w1", "s-1"))
            .await
            .unwrap();
        backend
            .write(&entry(MemoryType::Working, "w2", "s-1"))
            .await
            .unwrap();
        backend
            .write(&entry(MemoryType::Working, "other", "s-2"))
            .await
            .unwrap();
        backend
            .write(&entry(MemoryType::Episodic, "keep", "s-1"))
            .await
            .unwrap();

        let removed = backend
            .delete(&DeleteTarget::WorkingMemory("s-1".to_string()))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.count().await.unwrap(), 2);

        let removed = backend
            .delete(&DeleteTarget::WorkingMemory("s-1".to_string()))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_touch_updates_accessed_at() {
        let (_dir, backend) = open_temp().await;
        let e = entry(MemoryType::Semantic, "Touched", "s-1");
        let untouched = entry(MemoryType::Semantic, "Untouched", "s-1");
        backend.write(&e).await.unwrap();
        backend.write(&untouched).await.unwrap();

        let later = e.accessed_at + Duration::minutes(5);
        backend.touch(&[e.id], later).await.unwrap();

        let stored = backend.get(e.id).await.unwrap().unwrap();
        assert_eq!(stored.accessed_at.timestamp_micros(), later.timestamp_micros());
        let other = backend.get(untouched.id).await.unwrap().unwrap();
        assert_eq!(
            other.accessed_at.timestamp_micros(),
            untouched.accessed_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_graph_operations_unsupported() {
        let (_dir, backend) = open_temp().await;
        assert!(!backend.capabilities().graph_traversal);
        let err = backend.code_context(&[Uuid::new_v4()]).await.unwrap_err();
        assert!(matches!(err, BackendError::Unsupported { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stored_entries_visible_during_touches_and_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RelationalBackend::open(temp_dir.path()).await.unwrap());

        let stored: Vec<MemoryEntry> = (0..20)
            .map(|i| entry(MemoryType::Semantic, &format!("Stored {i}"), "s-1"))
            .collect();
        for e in &stored {
            backend.write(e).await.unwrap();
        }
        let ids: Vec<EntryId> = stored.iter().map(|e| e.id).collect();

        // Touches move rows to new fragments while fresh writes land.
        let churn = {
            let backend = Arc::clone(&backend);
            let ids = ids.clone();
            tokio::spawn(async move {
                for i in 0..30 {
                    backend.touch(&ids[i % 5..], Utc::now()).await.unwrap();
                    let extra = entry(MemoryType::Semantic, &format!("Extra {i}"), "s-1");
                    backend.write(&extra).await.unwrap();
                }
            })
        };

        while !churn.is_finished() {
            let found = backend
                .read(&MemoryQuery::new().with_session("s-1").with_limit(1000))
                .await
                .unwrap();
            for id in &ids {
                assert!(found.iter().any(|e| e.id == *id), "entry {id} missing");
            }
        }
        churn.await.unwrap();
        assert_eq!(backend.count().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_compaction_keeps_every_entry() {
        let (_dir, backend) = open_temp().await;
        for i in 0..COMPACT_EVERY + 3 {
            backend
                .write(&entry(MemoryType::Episodic, &format!("Entry {i}"), "s-1"))
                .await
                .unwrap();
        }

        assert_eq!(backend.mutations.load(Ordering::Acquire), 3);
        let found = backend
            .read(&MemoryQuery::new().with_limit(1000))
            .await
            .unwrap();
        assert_eq!(found.len(), COMPACT_EVERY + 3);
    }
}
