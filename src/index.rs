//! Record index backends for the recorder
//!
//! The recorder writes report frames to a flat data file and keeps a side
//! index so readers can seek straight to a record without scanning the file.
//! The index is rebuildable from the data file, so backends trade durability
//! for write speed.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{Connection, SqliteConnection};
use uuid::Uuid;

use crate::ProbeIndex;

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised by index backends
#[derive(Debug)]
pub enum IndexError {
    /// Opening or preparing the index store failed
    OpenFailed(String),

    /// An insert or teardown statement failed
    QueryFailed(String),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::OpenFailed(msg) => write!(f, "unable to open record index: {}", msg),
            IndexError::QueryFailed(msg) => write!(f, "record index query failed: {}", msg),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        IndexError::QueryFailed(err.to_string())
    }
}

/// One indexed record: where a report landed in the data file and the
/// identifying fields to find it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Report timestamp (epoch seconds, the aligned boundary).
    pub time: i64,

    /// Controller instance the report came from.
    pub uuid: Uuid,

    /// Qualified topic the report was published under.
    pub probe: String,

    /// Publishing node id.
    pub tag: String,

    /// Probe index within its controller.
    pub index: ProbeIndex,

    /// Byte offset of the record payload in the data file.
    pub offset: u64,

    /// Payload size in bytes.
    pub size: u64,
}

/// Trait for record index backends
#[async_trait]
pub trait RecordIndex: Send {
    async fn insert(&mut self, entry: &IndexEntry) -> IndexResult<()>;

    async fn close(&mut self) -> IndexResult<()>;
}

/// SQLite-backed record index.
///
/// Journaling and synchronous writes are disabled: the index only matters if
/// the data file it points into survives, and it can be rebuilt from that
/// file after a crash. Opening drops any previous index table, matching the
/// truncate-on-open behavior of the data file.
pub struct SqliteIndex {
    connection: SqliteConnection,
}

impl SqliteIndex {
    pub async fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Off)
            .synchronous(SqliteSynchronous::Off);

        let mut connection = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| IndexError::OpenFailed(e.to_string()))?;

        sqlx::query("DROP TABLE IF EXISTS probes")
            .execute(&mut connection)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE probes (
                time INTEGER NOT NULL,
                uuid TEXT NOT NULL,
                probe TEXT NOT NULL,
                tag TEXT NOT NULL,
                pindex INTEGER NOT NULL,
                "offset" INTEGER NOT NULL,
                size INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut connection)
        .await?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl RecordIndex for SqliteIndex {
    async fn insert(&mut self, entry: &IndexEntry) -> IndexResult<()> {
        sqlx::query(
            r#"
            INSERT INTO probes (time, uuid, probe, tag, pindex, "offset", size)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.time)
        .bind(entry.uuid.to_string())
        .bind(&entry.probe)
        .bind(&entry.tag)
        .bind(i64::from(entry.index))
        .bind(entry.offset as i64)
        .bind(entry.size as i64)
        .execute(&mut self.connection)
        .await?;

        Ok(())
    }

    async fn close(&mut self) -> IndexResult<()> {
        Ok(())
    }
}

/// In-memory index for tests.
///
/// Clones share the entry list, so a test can hand one clone to a recorder
/// and inspect the other after shutdown.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    entries: std::sync::Arc<std::sync::Mutex<Vec<IndexEntry>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<IndexEntry> {
        self.entries.lock().expect("entry lock poisoned").clone()
    }
}

#[async_trait]
impl RecordIndex for MemoryIndex {
    async fn insert(&mut self, entry: &IndexEntry) -> IndexResult<()> {
        self.entries
            .lock()
            .expect("entry lock poisoned")
            .push(entry.clone());
        Ok(())
    }

    async fn close(&mut self) -> IndexResult<()> {
        Ok(())
    }
}
