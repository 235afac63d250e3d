//! Database connection implementations

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::{
    config::{DatabaseConfig, DatabaseType},
    error::{DatabaseError, Result},
    models::{BatchOp, Checkpoint, WriteBatch},
    traits::KeyValueStore,
};

/// SQLite schema for the key/value and checkpoint tables
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key BLOB PRIMARY KEY,
    value BLOB NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS checkpoints (
    source TEXT PRIMARY KEY,
    file_number INTEGER NOT NULL,
    offset INTEGER NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
"#;

/// Storage behind a connection
pub enum Backend {
    Sqlite(Connection),
    Memory(MemoryTables),
}

#[derive(Debug, Default)]
pub struct MemoryTables {
    kv: BTreeMap<Vec<u8>, Vec<u8>>,
    checkpoints: HashMap<String, Checkpoint>,
}

/// Main database connection structure
pub struct DatabaseConnection {
    backend: Backend,
    config: DatabaseConfig,
}

impl DatabaseConnection {
    /// Open a connection and create the schema if needed
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        let backend = match config.database_type {
            DatabaseType::Sqlite => Backend::Sqlite(open_sqlite(&config)?),
            DatabaseType::Memory => Backend::Memory(MemoryTables::default()),
        };

        Ok(Self { backend, config })
    }

    /// Create a new volatile in-memory store
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryTables::default()),
            config: DatabaseConfig::memory(),
        }
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}

fn open_sqlite(config: &DatabaseConfig) -> Result<Connection> {
    let path = config.sqlite_path()?;
    let conn = Connection::open(path)
        .map_err(|e| DatabaseError::ConnectionError(format!("{}: {}", path.display(), e)))?;

    conn.busy_timeout(Duration::from_secs(config.busy_timeout_seconds))?;
    if config.use_wal() {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {}", mode);
    }

    conn.execute_batch(SQLITE_SCHEMA)
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create schema: {}", e)))?;

    log::info!("Opened SQLite store at {}", path.display());
    Ok(conn)
}

impl KeyValueStore for DatabaseConnection {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match &self.backend {
            Backend::Sqlite(conn) => {
                let value = conn
                    .prepare_cached("SELECT value FROM kv WHERE key = ?1")?
                    .query_row(params![key], |row| row.get(0))
                    .optional()?;
                Ok(value)
            }
            Backend::Memory(tables) => Ok(tables.kv.get(key).cloned()),
        }
    }

    fn write_batch(&mut self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        match &mut self.backend {
            Backend::Sqlite(conn) => {
                let tx = conn.transaction()?;
                {
                    let mut put = tx.prepare_cached(
                        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                    )?;
                    let mut delete = tx.prepare_cached("DELETE FROM kv WHERE key = ?1")?;
                    for op in &batch.ops {
                        match op {
                            BatchOp::Put { key, value } => put.execute(params![key, value])?,
                            BatchOp::Delete { key } => delete.execute(params![key])?,
                        };
                    }

                    let mut checkpoint = tx.prepare_cached(
                        "INSERT INTO checkpoints (source, file_number, offset) VALUES (?1, ?2, ?3)
                         ON CONFLICT(source) DO UPDATE SET
                             file_number = excluded.file_number,
                             offset = excluded.offset,
                             updated_at = strftime('%s', 'now')",
                    )?;
                    for cp in &batch.checkpoints {
                        checkpoint.execute(params![cp.source, cp.file_number, cp.offset as i64])?;
                    }
                }
                tx.commit()
                    .map_err(|e| DatabaseError::TransactionError(format!("Commit failed: {}", e)))?;
            }
            Backend::Memory(tables) => {
                for op in batch.ops {
                    match op {
                        BatchOp::Put { key, value } => {
                            tables.kv.insert(key, value);
                        }
                        BatchOp::Delete { key } => {
                            tables.kv.remove(&key);
                        }
                    }
                }
                for cp in batch.checkpoints {
                    tables.checkpoints.insert(cp.source.clone(), cp);
                }
            }
        }

        Ok(())
    }

    fn checkpoint(&self, source: &str) -> Result<Option<Checkpoint>> {
        match &self.backend {
            Backend::Sqlite(conn) => {
                let checkpoint = conn
                    .prepare_cached(
                        "SELECT file_number, offset FROM checkpoints WHERE source = ?1",
                    )?
                    .query_row(params![source], |row| {
                        Ok(Checkpoint {
                            source: source.to_string(),
                            file_number: row.get(0)?,
                            offset: row.get::<_, i64>(1)? as u64,
                        })
                    })
                    .optional()?;
                Ok(checkpoint)
            }
            Backend::Memory(tables) => Ok(tables.checkpoints.get(source).cloned()),
        }
    }

    fn health_check(&self) -> Result<()> {
        match &self.backend {
            Backend::Sqlite(conn) => {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            }
            Backend::Memory(_) => Ok(()),
        }
    }

    fn database_type(&self) -> DatabaseType {
        self.config.database_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(source: &str, offset: u64) -> Checkpoint {
        Checkpoint {
            source: source.to_string(),
            file_number: 0,
            offset,
        }
    }

    fn exercise(conn: &mut DatabaseConnection) {
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec())
            .put(b"b".to_vec(), b"2".to_vec())
            .set_checkpoint(checkpoint("main", 10));
        conn.write_batch(batch).unwrap();

        assert_eq!(conn.read(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(conn.checkpoint("main").unwrap().unwrap().offset, 10);
        assert!(conn.checkpoint("other").unwrap().is_none());

        let mut batch = WriteBatch::new();
        batch.delete(b"a".to_vec())
            .put(b"b".to_vec(), b"3".to_vec())
            .set_checkpoint(checkpoint("main", 20));
        conn.write_batch(batch).unwrap();

        assert_eq!(conn.read(b"a").unwrap(), None);
        assert_eq!(conn.read(b"b").unwrap(), Some(b"3".to_vec()));
        assert_eq!(conn.checkpoint("main").unwrap().unwrap().offset, 20);
    }

    #[test]
    fn test_memory_backend() {
        let mut conn = DatabaseConnection::memory();
        conn.health_check().unwrap();
        assert_eq!(conn.database_type(), DatabaseType::Memory);
        exercise(&mut conn);
    }

    #[test]
    fn test_sqlite_backend() {
        let mut conn = DatabaseConnection::new(DatabaseConfig::sqlite(":memory:")).unwrap();
        conn.health_check().unwrap();
        assert_eq!(conn.database_type(), DatabaseType::Sqlite);
        exercise(&mut conn);
    }

    #[test]
    fn test_set_checkpoint_keeps_last_per_source() {
        let mut batch = WriteBatch::new();
        batch.set_checkpoint(checkpoint("main", 1))
            .set_checkpoint(checkpoint("main", 2));
        assert_eq!(batch.checkpoints.len(), 1);
        assert_eq!(batch.checkpoints[0].offset, 2);
    }
}
