use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gavel_core::{AuctionStatus, ProductCondition};
use rusqlite::{Connection, ErrorCode, InterruptHandle};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::store::AuctionStore;
use crate::types::{AuctionRecord, ExpiryFilter};

const MAX_COLLECTION_LEN: usize = 64;

/// Reject anything that is not a plain SQL identifier.
///
/// Collection names are interpolated into DDL/DML, so only ASCII letters,
/// digits and `_` are accepted, and the first character must not be a digit.
pub fn validate_collection(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && !name.to_ascii_lowercase().starts_with("sqlite_");
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

/// Initialise the auction table `collection` in `conn`.
///
/// Idempotent. The `(status, timestamp)` index keeps the expiry sweep's
/// `WHERE status = ? AND timestamp <= ?` cheap as the table grows.
pub fn init_collection(conn: &Connection, collection: &str) -> Result<()> {
    validate_collection(collection)?;
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS \"{collection}\" (
            id            TEXT    NOT NULL PRIMARY KEY,
            product_name  TEXT    NOT NULL,
            category      TEXT    NOT NULL,
            description   TEXT    NOT NULL,
            condition     INTEGER NOT NULL,
            status        INTEGER NOT NULL DEFAULT 0,  -- 0 active, 1 completed
            timestamp     INTEGER NOT NULL             -- unix seconds
        ) STRICT;

        CREATE INDEX IF NOT EXISTS \"idx_{collection}_status_timestamp\"
            ON \"{collection}\" (status, timestamp);
        "
    ))?;
    Ok(())
}

struct Inner {
    conn: Connection,
    /// Collections whose table has already been created on this connection.
    ready: HashSet<String>,
}

/// SQLite-backed [`AuctionStore`].
///
/// Holds one connection behind a `Mutex`; every call runs on the blocking
/// pool so async callers are never stalled by disk I/O. Tables are created
/// on first use of a collection name.
///
/// A running batch update can be aborted through
/// [`AuctionStore::interrupt`]; SQLite rolls the statement back, so an
/// interrupted update changes no rows.
#[derive(Clone)]
pub struct SqliteAuctionStore {
    inner: Arc<Mutex<Inner>>,
    interrupt_handle: Arc<InterruptHandle>,
    /// Set while an `update_many` statement holds the connection.
    updating: Arc<Mutex<bool>>,
}

impl SqliteAuctionStore {
    /// Wrap an already-open connection.
    pub fn new(conn: Connection) -> Self {
        let interrupt_handle = Arc::new(conn.get_interrupt_handle());
        Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                ready: HashSet::new(),
            })),
            interrupt_handle,
            updating: Arc::new(Mutex::new(false)),
        }
    }

    /// Open (or create) a database file in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!(path = %path.as_ref().display(), "opened auction database");
        Ok(Self::new(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Fetch one auction by id, or `None` if absent.
    pub async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<AuctionRecord>> {
        let id = id.to_string();
        self.with_conn(collection, move |conn, table| {
            let row = conn.query_row(
                &format!(
                    "SELECT id, product_name, category, description, condition, status, timestamp
                     FROM \"{table}\" WHERE id = ?1"
                ),
                [&id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?, // id
                        row.get::<_, String>(1)?, // product_name
                        row.get::<_, String>(2)?, // category
                        row.get::<_, String>(3)?, // description
                        row.get::<_, i64>(4)?,    // condition
                        row.get::<_, i64>(5)?,    // status
                        row.get::<_, i64>(6)?,    // timestamp
                    ))
                },
            );
            let (id, product_name, category, description, condition, status, timestamp) = match row
            {
                Ok(r) => r,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(StoreError::Database(e)),
            };
            let corrupt = |reason| StoreError::CorruptRecord {
                id: id.clone(),
                reason,
            };
            let condition = ProductCondition::try_from(condition).map_err(corrupt)?;
            let status = AuctionStatus::try_from(status).map_err(corrupt)?;
            Ok(Some(AuctionRecord {
                id,
                product_name,
                category,
                description,
                condition,
                status,
                timestamp,
            }))
        })
        .await
    }

    /// Count rows in `collection` currently in `status`.
    pub async fn count_by_status(&self, collection: &str, status: AuctionStatus) -> Result<u64> {
        self.with_conn(collection, move |conn, table| {
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM \"{table}\" WHERE status = ?1"),
                [status.as_i64()],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool, creating the
    /// collection's table first if this store has not seen it yet.
    async fn with_conn<T, F>(&self, collection: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T> + Send + 'static,
    {
        validate_collection(collection)?;
        let inner = Arc::clone(&self.inner);
        let collection = collection.to_string();

        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().map_err(|_| StoreError::Poisoned)?;
            if !guard.ready.contains(&collection) {
                init_collection(&guard.conn, &collection)?;
                guard.ready.insert(collection.clone());
                debug!(%collection, "auction collection ready");
            }
            f(&guard.conn, &collection)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl AuctionStore for SqliteAuctionStore {
    async fn insert_one(&self, collection: &str, record: &AuctionRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(collection, move |conn, table| {
            conn.execute(
                &format!(
                    "INSERT INTO \"{table}\"
                     (id, product_name, category, description, condition, status, timestamp)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)"
                ),
                rusqlite::params![
                    record.id,
                    record.product_name,
                    record.category,
                    record.description,
                    record.condition.as_i64(),
                    record.status.as_i64(),
                    record.timestamp,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &ExpiryFilter,
        status: AuctionStatus,
    ) -> Result<u64> {
        let filter = *filter;
        let updating = Arc::clone(&self.updating);
        self.with_conn(collection, move |conn, table| {
            set_flag(&updating, true);
            let result = conn.execute(
                &format!(
                    "UPDATE \"{table}\" SET status = ?1
                     WHERE status = ?2 AND timestamp <= ?3"
                ),
                rusqlite::params![
                    status.as_i64(),
                    filter.status.as_i64(),
                    filter.timestamp_lte
                ],
            );
            set_flag(&updating, false);
            match result {
                Ok(n) => Ok(n as u64),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::OperationInterrupted =>
                {
                    Err(StoreError::Interrupted)
                }
                Err(e) => Err(StoreError::Database(e)),
            }
        })
        .await
    }

    fn interrupt(&self) {
        // Only while our UPDATE runs; otherwise an insert sharing the
        // connection could be aborted instead.
        let updating = self.updating.lock().unwrap_or_else(|e| e.into_inner());
        if *updating {
            self.interrupt_handle.interrupt();
            debug!("interrupted in-flight expiry update");
        }
    }
}

fn set_flag(flag: &Mutex<bool>, value: bool) {
    *flag.lock().unwrap_or_else(|e| e.into_inner()) = value;
}
