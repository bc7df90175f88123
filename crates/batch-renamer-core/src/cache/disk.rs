//! Tier 2: durable SQLite table behind the memory tier.

use super::CachedRecord;
use crate::error::Error;
use crate::model::{CacheEntry, EntryKind};
use crate::storage::Database;
use rusqlite::{params, OptionalExtension};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

pub struct DiskTier {
    db: Mutex<Database>,
}

impl DiskTier {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, Error> {
        self.db
            .lock()
            .map_err(|e| Error::Cache(format!("Failed to lock cache database: {}", e)))
    }

    /// Undecodable payloads are deleted and reported as a miss.
    pub fn get(&self, path: &str, kind: EntryKind) -> Result<Option<CachedRecord>, Error> {
        let db = self.lock()?;
        let row: Option<(Vec<u8>, i64)> = db
            .connection()
            .query_row(
                "SELECT payload, source_mtime FROM cache_entry WHERE path = ?1 AND kind = ?2",
                params![path, kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, source_mtime)) = row else {
            return Ok(None);
        };

        match bincode::deserialize::<CacheEntry>(&payload) {
            Ok(entry) if entry.kind() == kind => Ok(Some(CachedRecord {
                entry,
                source_mtime,
            })),
            Ok(_) | Err(_) => {
                warn!("Dropping corrupt cache entry for {} ({})", path, kind.as_str());
                db.connection().execute(
                    "DELETE FROM cache_entry WHERE path = ?1 AND kind = ?2",
                    params![path, kind.as_str()],
                )?;
                Ok(None)
            }
        }
    }

    pub fn put(&self, path: &str, record: &CachedRecord) -> Result<(), Error> {
        let payload = bincode::serialize(&record.entry)
            .map_err(|e| Error::Cache(format!("Serialize error: {}", e)))?;
        let db = self.lock()?;
        db.connection().execute(
            "INSERT INTO cache_entry (path, kind, payload, is_extended, timestamp, source_mtime) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(path, kind) DO UPDATE SET \
                 payload = excluded.payload, \
                 is_extended = excluded.is_extended, \
                 timestamp = excluded.timestamp, \
                 source_mtime = excluded.source_mtime",
            params![
                path,
                record.entry.kind().as_str(),
                payload,
                record.entry.is_extended(),
                record.entry.timestamp(),
                record.source_mtime,
            ],
        )?;
        Ok(())
    }

    pub fn remove_if_stale(&self, path: &str, kind: EntryKind, source_mtime: i64) -> Result<(), Error> {
        let db = self.lock()?;
        db.connection().execute(
            "DELETE FROM cache_entry WHERE path = ?1 AND kind = ?2 AND source_mtime = ?3",
            params![path, kind.as_str(), source_mtime],
        )?;
        Ok(())
    }

    pub fn remove_path(&self, path: &str) -> Result<(), Error> {
        let db = self.lock()?;
        db.connection()
            .execute("DELETE FROM cache_entry WHERE path = ?1", params![path])?;
        Ok(())
    }

    /// Relocate all rows of `old` to `new` in one transaction. Rows already at
    /// `new` are replaced.
    pub fn remap(&self, old: &str, new: &str) -> Result<usize, Error> {
        let db = self.lock()?;
        let tx = db.connection().unchecked_transaction()?;
        tx.execute("DELETE FROM cache_entry WHERE path = ?1", params![new])?;
        let moved = tx.execute(
            "UPDATE cache_entry SET path = ?1 WHERE path = ?2",
            params![new, old],
        )?;
        tx.commit()?;
        Ok(moved)
    }

    pub fn clear(&self) -> Result<(), Error> {
        let db = self.lock()?;
        db.connection().execute("DELETE FROM cache_entry", [])?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize, Error> {
        let db = self.lock()?;
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM cache_entry", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn block_updates(&self) {
        let db = self.lock().unwrap();
        db.connection()
            .execute_batch(
                "CREATE TRIGGER block_update BEFORE UPDATE ON cache_entry \
                 BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
            )
            .unwrap();
    }

    #[cfg(test)]
    pub(crate) fn corrupt_payload(&self, path: &str, kind: EntryKind) {
        let db = self.lock().unwrap();
        db.connection()
            .execute(
                "UPDATE cache_entry SET payload = X'FFFFFFFF' WHERE path = ?1 AND kind = ?2",
                params![path, kind.as_str()],
            )
            .unwrap();
    }
}
