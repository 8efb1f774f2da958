//! Write transaction used for sequence allocation.
//!
//! The transaction runs on its own connection so statements issued on the
//! shared connection by concurrent item tasks never land inside it. Dropping
//! an uncommitted [`SequenceTx`] closes the connection, which rolls back.

use chrono::Utc;
use errorpress_shared::{ItemState, Result};
use libsql::{Connection, params};

use crate::storage_err;

/// Registry columns for an item created inside a [`SequenceTx`].
#[derive(Debug, Clone)]
pub struct NewItemRow<'a> {
    pub sequence_id: u64,
    pub slug: &'a str,
    pub fingerprint: &'a str,
    pub source: &'a str,
    pub state: ItemState,
    pub slot_dir: &'a str,
}

/// An open `BEGIN IMMEDIATE` transaction.
pub struct SequenceTx {
    conn: Connection,
}

impl SequenceTx {
    pub(crate) async fn begin(conn: Connection) -> Result<Self> {
        conn.execute("BEGIN IMMEDIATE", params![])
            .await
            .map_err(storage_err)?;
        Ok(Self { conn })
    }

    /// Persisted high-water mark.
    pub async fn marker(&self) -> Result<u64> {
        self.single_u64("SELECT max_sequence FROM sequence_marker WHERE id = 1")
            .await
    }

    /// Largest sequence id present in the item registry, or 0.
    pub async fn max_item_sequence(&self) -> Result<u64> {
        self.single_u64("SELECT COALESCE(MAX(sequence_id), 0) FROM items")
            .await
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM items WHERE slug = ?1", slug).await
    }

    pub async fn fingerprint_indexed(&self, fingerprint: &str) -> Result<bool> {
        self.exists(
            "SELECT 1 FROM dedup_fingerprints WHERE fingerprint = ?1",
            fingerprint,
        )
        .await
    }

    pub async fn insert_item(&self, row: &NewItemRow<'_>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO items (sequence_id, slug, fingerprint, source, state, slot_dir, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.sequence_id as i64,
                    row.slug,
                    row.fingerprint,
                    row.source,
                    row.state.as_str(),
                    row.slot_dir,
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Add a fingerprint to the dedup index. An existing entry is left as is.
    pub async fn index_fingerprint(&self, fingerprint: &str, sequence_id: u64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO dedup_fingerprints (fingerprint, sequence_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![fingerprint, sequence_id as i64, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn set_marker(&self, sequence_id: u64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sequence_marker SET max_sequence = ?1 WHERE id = 1",
                params![sequence_id as i64],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.conn
            .execute("COMMIT", params![])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.conn
            .execute("ROLLBACK", params![])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn single_u64(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    async fn exists(&self, sql: &str, value: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(sql, params![value])
            .await
            .map_err(storage_err)?;
        Ok(rows.next().await.map_err(storage_err)?.is_some())
    }
}
