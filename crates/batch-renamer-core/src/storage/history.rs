use super::sqlite::{Database, Schema};
use crate::error::Error;
use crate::model::{BatchStatus, RenameOperation, RenameRecord};
use rusqlite::{params, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Listing row for a recorded batch.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: i64,
    pub created_at: String,
    pub status: BatchStatus,
    pub item_count: i64,
    pub applied_count: i64,
    pub undone_at: Option<String>,
}

/// Append-only log of executed rename batches.
///
/// Only [`crate::RenameEngine`] writes to it (`record` after execute,
/// `mark_undone` after undo); everything else reads.
pub struct RenameHistoryStore {
    db: Mutex<Database>,
}

impl RenameHistoryStore {
    /// Open the history database, starting from an empty log if the file is
    /// corrupt or cannot be created.
    pub fn open(path: &str) -> Result<Self, Error> {
        let db = match Database::open_or_recover(path, Schema::History) {
            Some(db) => db,
            None => {
                warn!("History will not persist this session");
                Database::open_in_memory(Schema::History)?
            }
        };
        debug!("Using '{}' for rename history", path);
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn in_memory() -> Result<Self, Error> {
        Ok(Self {
            db: Mutex::new(Database::open_in_memory(Schema::History)?),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, Error> {
        self.db
            .lock()
            .map_err(|e| Error::Other(format!("Failed to lock history: {}", e)))
    }

    pub(crate) fn record(
        &self,
        status: BatchStatus,
        records: &[RenameRecord],
    ) -> Result<i64, Error> {
        let db = self.lock()?;
        let tx = db.connection().unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO rename_batch (created_at, status) VALUES (?1, ?2)",
            params![now, status.as_str()],
        )?;
        let batch_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO rename_item \
                 (batch_id, seq, old_path, new_path, timestamp, outcome) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (seq, record) in records.iter().enumerate() {
                stmt.execute(params![
                    batch_id,
                    seq as i64,
                    record.old_path.to_string_lossy(),
                    record.new_path.to_string_lossy(),
                    record.timestamp,
                    record.outcome,
                ])?;
            }
        }
        tx.commit()?;
        info!("Recorded rename batch {} ({} items)", batch_id, records.len());
        Ok(batch_id)
    }

    pub(crate) fn mark_undone(&self, batch_id: i64) -> Result<(), Error> {
        let db = self.lock()?;
        let now = chrono::Utc::now().to_rfc3339();
        db.connection().execute(
            "UPDATE rename_batch SET undone_at = ?1 WHERE id = ?2",
            params![now, batch_id],
        )?;
        Ok(())
    }

    /// Batches newest-first.
    pub fn list(&self, limit: i64) -> Result<Vec<BatchSummary>, Error> {
        let db = self.lock()?;
        let mut stmt = db.connection().prepare(
            "SELECT b.id, b.created_at, b.status, b.undone_at, COUNT(i.seq), \
                    SUM(CASE WHEN i.outcome IN ('renamed', 'overwritten', 'renamed_with_suffix') \
                        THEN 1 ELSE 0 END) \
             FROM rename_batch b \
             LEFT JOIN rename_item i ON i.batch_id = b.id \
             GROUP BY b.id \
             ORDER BY b.id DESC \
             LIMIT ?1",
        )?;
        let batches = stmt
            .query_map(params![limit], |row| {
                Ok(BatchSummary {
                    batch_id: row.get(0)?,
                    created_at: row.get(1)?,
                    status: BatchStatus::parse(&row.get::<_, String>(2)?),
                    undone_at: row.get(3)?,
                    item_count: row.get(4)?,
                    applied_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(batches)
    }

    pub fn get(&self, batch_id: i64) -> Result<Option<RenameOperation>, Error> {
        let db = self.lock()?;
        let header = db
            .connection()
            .query_row(
                "SELECT created_at, status, undone_at FROM rename_batch WHERE id = ?1",
                params![batch_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((created_at, status, undone_at)) = header else {
            return Ok(None);
        };

        let mut stmt = db.connection().prepare(
            "SELECT old_path, new_path, timestamp, outcome FROM rename_item \
             WHERE batch_id = ?1 ORDER BY seq",
        )?;
        let records = stmt
            .query_map(params![batch_id], |row| {
                Ok(RenameRecord {
                    old_path: PathBuf::from(row.get::<_, String>(0)?),
                    new_path: PathBuf::from(row.get::<_, String>(1)?),
                    timestamp: row.get(2)?,
                    outcome: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(RenameOperation {
            batch_id,
            created_at,
            status: BatchStatus::parse(&status),
            undone_at,
            records,
        }))
    }

    /// Most recent batch that has not been undone.
    pub fn latest_undoable(&self) -> Result<Option<i64>, Error> {
        let db = self.lock()?;
        let id = db
            .connection()
            .query_row(
                "SELECT id FROM rename_batch WHERE undone_at IS NULL ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn clear(&self) -> Result<(), Error> {
        let db = self.lock()?;
        db.connection().execute_batch(
            "DELETE FROM rename_item;
             DELETE FROM rename_batch;",
        )?;
        info!("Rename history cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(old: &str, new: &str, outcome: &str) -> RenameRecord {
        RenameRecord {
            old_path: PathBuf::from(old),
            new_path: PathBuf::from(new),
            timestamp: 1_700_000_000_000,
            outcome: outcome.to_string(),
        }
    }

    #[test]
    fn test_record_and_get_preserves_order() {
        let store = RenameHistoryStore::in_memory().unwrap();
        let records = vec![
            record("/p/a.jpg", "/p/x.jpg", "renamed"),
            record("/p/b.jpg", "/p/y.jpg", "failed: denied"),
            record("/p/c.jpg", "/p/z.jpg", "renamed_with_suffix"),
        ];
        let id = store.record(BatchStatus::PartiallyFailed, &records).unwrap();

        let op = store.get(id).unwrap().unwrap();
        assert_eq!(op.batch_id, id);
        assert_eq!(op.status, BatchStatus::PartiallyFailed);
        assert_eq!(op.records, records);
        assert!(op.undone_at.is_none());
    }

    #[test]
    fn test_list_is_most_recent_first() {
        let store = RenameHistoryStore::in_memory().unwrap();
        let first = store
            .record(BatchStatus::Completed, &[record("/a", "/b", "renamed")])
            .unwrap();
        let second = store
            .record(
                BatchStatus::Completed,
                &[record("/c", "/d", "renamed"), record("/e", "/f", "skipped")],
            )
            .unwrap();

        let batches = store.list(10).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].batch_id, second);
        assert_eq!(batches[0].item_count, 2);
        assert_eq!(batches[0].applied_count, 1);
        assert_eq!(batches[1].batch_id, first);
    }

    #[test]
    fn test_latest_undoable_skips_undone() {
        let store = RenameHistoryStore::in_memory().unwrap();
        let first = store
            .record(BatchStatus::Completed, &[record("/a", "/b", "renamed")])
            .unwrap();
        let second = store
            .record(BatchStatus::Completed, &[record("/c", "/d", "renamed")])
            .unwrap();
        assert_eq!(store.latest_undoable().unwrap(), Some(second));

        store.mark_undone(second).unwrap();
        assert_eq!(store.latest_undoable().unwrap(), Some(first));
        assert!(store.get(second).unwrap().unwrap().undone_at.is_some());
    }

    #[test]
    fn test_clear_and_missing_batch() {
        let store = RenameHistoryStore::in_memory().unwrap();
        let id = store
            .record(BatchStatus::Completed, &[record("/a", "/b", "renamed")])
            .unwrap();
        store.clear().unwrap();
        assert!(store.get(id).unwrap().is_none());
        assert!(store.list(10).unwrap().is_empty());
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let path = path.to_str().unwrap();

        let id = {
            let store = RenameHistoryStore::open(path).unwrap();
            store
                .record(BatchStatus::Completed, &[record("/a", "/b", "renamed")])
                .unwrap()
        };

        let store = RenameHistoryStore::open(path).unwrap();
        let op = store.get(id).unwrap().unwrap();
        assert_eq!(op.records.len(), 1);
    }
}
