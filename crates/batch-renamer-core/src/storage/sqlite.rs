use rusqlite::{Connection, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Which set of tables a database file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Cache,
    History,
}

impl Schema {
    fn version(&self) -> i64 {
        match self {
            Schema::Cache => 1,
            Schema::History => 1,
        }
    }

    fn ddl(&self) -> &'static str {
        match self {
            Schema::Cache => include_str!("cache_schema.sql"),
            Schema::History => include_str!("history_schema.sql"),
        }
    }

    /// Cache contents are derived from the filesystem and may be dropped on a
    /// version bump. History is never dropped.
    fn drop_on_upgrade(&self) -> &'static str {
        match self {
            Schema::Cache => "DROP TABLE IF EXISTS cache_entry;",
            Schema::History => "",
        }
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &str, schema: Schema) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.check_integrity()?;
        db.migrate_schema(schema)?;
        Ok(db)
    }

    pub fn open_in_memory(schema: Schema) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema(schema)?;
        Ok(db)
    }

    /// Open `path`, moving an unreadable file aside and starting empty rather
    /// than failing. Returns `None` only if a fresh file cannot be created either.
    pub fn open_or_recover(path: &str, schema: Schema) -> Option<Self> {
        match Database::open(path, schema) {
            Ok(db) => return Some(db),
            Err(e) => warn!("Database '{}' unusable ({}), starting empty", path, e),
        }

        if Path::new(path).exists() {
            let aside = format!("{}.corrupt", path);
            if let Err(e) = fs::rename(path, &aside) {
                warn!("Could not move '{}' aside: {}", path, e);
                let _ = fs::remove_file(path);
            }
            for suffix in ["-wal", "-shm"] {
                let _ = fs::remove_file(format!("{}{}", path, suffix));
            }
        }

        match Database::open(path, schema) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("Database '{}' could not be recreated: {}", path, e);
                None
            }
        }
    }

    fn configure_pragmas(&self) -> Result<()> {
        // journal_mode returns a row, so it cannot go through execute_batch on
        // every SQLite build; query it instead.
        let _mode: String = self
            .conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        self.conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode)");
        Ok(())
    }

    fn check_integrity(&self) -> Result<()> {
        let status: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if status != "ok" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
                Some(status),
            ));
        }
        Ok(())
    }

    fn migrate_schema(&self, schema: Schema) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version != 0 && version < schema.version() {
            debug!(
                "Schema version {} < {}, dropping derived tables",
                version,
                schema.version()
            );
            self.conn.execute_batch(schema.drop_on_upgrade())?;
        }

        self.conn.execute_batch(schema.ddl())?;
        self.conn
            .pragma_update(None, "user_version", schema.version())?;
        debug!("SQLite {:?} schema initialized", schema);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let db = Database::open(path.to_str().unwrap(), Schema::History).unwrap();
        let count: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'rename_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_recover_from_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        fs::write(&path, vec![0x5Au8; 8192]).unwrap();

        let db = Database::open_or_recover(path.to_str().unwrap(), Schema::Cache)
            .expect("recovery should yield a usable database");
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM cache_entry", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert!(dir.path().join("cache.db.corrupt").exists());
    }
}
