//! libSQL storage layer (embedded, offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the sequence marker,
//! the item registry, the dedup index, the publish log and run history.
//! Sequence allocation happens inside a [`SequenceTx`], a `BEGIN IMMEDIATE`
//! transaction on a dedicated connection.

mod migrations;
mod sequence;

use std::path::Path;

use chrono::{DateTime, Utc};
use errorpress_shared::{ItemState, PressError, PublishRef, PublishStatus, Result};
use libsql::{Connection, Database, params};
use uuid::Uuid;

pub use sequence::{NewItemRow, SequenceTx};

/// Milliseconds a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// One row of the item registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub sequence_id: u64,
    pub slug: String,
    pub fingerprint: String,
    pub source: String,
    pub state: ItemState,
    /// Slot directory name, relative to the slots root.
    pub slot_dir: String,
    pub publish_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A completed or in-flight pipeline run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub kind: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

pub(crate) fn storage_err(e: libsql::Error) -> PressError {
    PressError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PressError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;
        set_busy_timeout(&conn).await?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for listing only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PressError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;
        set_busy_timeout(&conn).await?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    PressError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PressError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sequence allocation
    // -----------------------------------------------------------------------

    /// Start a write transaction on a fresh connection. Other writers, in this
    /// process or another, block until it commits or is dropped.
    pub async fn begin_sequence_tx(&self) -> Result<SequenceTx> {
        self.check_writable()?;
        let conn = self.db.connect().map_err(storage_err)?;
        set_busy_timeout(&conn).await?;
        SequenceTx::begin(conn).await
    }

    /// Current value of the sequence high-water mark.
    pub async fn max_sequence(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT max_sequence FROM sequence_marker WHERE id = 1",
                params![],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Item registry
    // -----------------------------------------------------------------------

    /// Record a lifecycle state change. `publish_ref` is only written when given.
    pub async fn update_item_state(
        &self,
        sequence_id: u64,
        state: ItemState,
        publish_ref: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE items
                 SET state = ?1, publish_ref = COALESCE(?2, publish_ref), updated_at = ?3
                 WHERE sequence_id = ?4",
                params![state.as_str(), publish_ref, now.as_str(), sequence_id as i64],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(PressError::Storage(format!(
                "item {sequence_id} is not registered"
            )));
        }
        Ok(())
    }

    /// Get one registered item.
    pub async fn get_item(&self, sequence_id: u64) -> Result<Option<ItemRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT sequence_id, slug, fingerprint, source, state, slot_dir, publish_ref,
                        created_at, updated_at
                 FROM items WHERE sequence_id = ?1",
                params![sequence_id as i64],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All registered items in sequence order.
    pub async fn list_items(&self) -> Result<Vec<ItemRow>> {
        self.query_items(
            "SELECT sequence_id, slug, fingerprint, source, state, slot_dir, publish_ref,
                    created_at, updated_at
             FROM items ORDER BY sequence_id",
        )
        .await
    }

    /// Items not yet Published or Rejected, in sequence order.
    pub async fn list_pending_items(&self) -> Result<Vec<ItemRow>> {
        self.query_items(
            "SELECT sequence_id, slug, fingerprint, source, state, slot_dir, publish_ref,
                    created_at, updated_at
             FROM items WHERE state NOT IN ('published', 'rejected')
             ORDER BY sequence_id",
        )
        .await
    }

    async fn query_items(&self, sql: &str) -> Result<Vec<ItemRow>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_item(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Dedup index
    // -----------------------------------------------------------------------

    /// Every indexed fingerprint, oldest first.
    pub async fn fingerprints(&self) -> Result<Vec<String>> {
        self.query_strings("SELECT fingerprint FROM dedup_fingerprints ORDER BY rowid")
            .await
    }

    /// Whether a fingerprint was ever indexed.
    pub async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM dedup_fingerprints WHERE fingerprint = ?1",
                params![fingerprint],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows.next().await.map_err(storage_err)?.is_some())
    }

    /// Every indexed article title, oldest first.
    pub async fn titles(&self) -> Result<Vec<String>> {
        self.query_strings("SELECT title FROM dedup_titles ORDER BY rowid")
            .await
    }

    /// Index a normalized article title. Returns `false` when the title was
    /// already claimed by another item.
    pub async fn claim_title(&self, title: &str, sequence_id: u64) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO dedup_titles (title, sequence_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![title, sequence_id as i64, now.as_str()],
            )
            .await
            .map_err(storage_err)?;

        if inserted > 0 {
            return Ok(true);
        }

        // A resumed item may re-claim its own title.
        let mut rows = self
            .conn
            .query(
                "SELECT sequence_id FROM dedup_titles WHERE title = ?1",
                params![title],
            )
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64 == sequence_id),
            None => Ok(false),
        }
    }

    async fn query_strings(&self, sql: &str) -> Result<Vec<String>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Publish log
    // -----------------------------------------------------------------------

    /// The recorded publish reference for an item, if it was ever published.
    pub async fn get_publish(&self, sequence_id: u64) -> Result<Option<PublishRef>> {
        let mut rows = self
            .conn
            .query(
                "SELECT remote_id, remote_url FROM publish_log WHERE sequence_id = ?1",
                params![sequence_id as i64],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(PublishRef {
                id: row.get::<String>(0).map_err(storage_err)?,
                url: row.get::<String>(1).ok(),
            })),
            None => Ok(None),
        }
    }

    /// Record a publisher acknowledgement. A second record for the same item
    /// is refused so the first reference stays authoritative.
    pub async fn record_publish(
        &self,
        sequence_id: u64,
        publish_ref: &PublishRef,
        status: PublishStatus,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO publish_log (sequence_id, remote_id, remote_url, status, published_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sequence_id as i64,
                    publish_ref.id.as_str(),
                    publish_ref.url.as_deref(),
                    status.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;

        if inserted == 0 {
            tracing::warn!(sequence_id, "publish already recorded, keeping first reference");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Insert a new run. Returns the generated run ID.
    pub async fn start_run(&self, kind: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, kind, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), kind, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Mark a run finished with its summary.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, started_at, finished_at, stats_json
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(RunRecord {
                id: row.get::<String>(0).map_err(storage_err)?,
                kind: row.get::<String>(1).map_err(storage_err)?,
                started_at: row.get::<String>(2).map_err(storage_err)?,
                finished_at: row.get::<String>(3).ok(),
                stats_json: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }
}

/// `PRAGMA busy_timeout` returns a row, so it goes through `query`.
async fn set_busy_timeout(conn: &Connection) -> Result<()> {
    conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), params![])
        .await
        .map_err(storage_err)?;
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PressError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to an [`ItemRow`].
fn row_to_item(row: &libsql::Row) -> Result<ItemRow> {
    let state: String = row.get(4).map_err(storage_err)?;
    let created_at: String = row.get(7).map_err(storage_err)?;
    let updated_at: String = row.get(8).map_err(storage_err)?;
    Ok(ItemRow {
        sequence_id: row.get::<i64>(0).map_err(storage_err)? as u64,
        slug: row.get::<String>(1).map_err(storage_err)?,
        fingerprint: row.get::<String>(2).map_err(storage_err)?,
        source: row.get::<String>(3).map_err(storage_err)?,
        state: state
            .parse()
            .map_err(|e| PressError::Storage(format!("item row: {e}")))?,
        slot_dir: row.get::<String>(5).map_err(storage_err)?,
        publish_ref: row.get::<String>(6).ok(),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
