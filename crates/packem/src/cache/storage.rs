//! redb-backed cache storage.
//!
//! One database file at `<cache_dir>/cache.redb`; values are opaque bincode
//! blobs keyed by `<namespace>:<hash>`.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

const TASK_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Error types for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache miss")]
    CacheMiss,

    #[error("cache database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Runtime(#[from] crate::runtime::RuntimeError),

    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

macro_rules! database_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CacheError {
                fn from(err: $ty) -> Self {
                    CacheError::DatabaseError(err.to_string())
                }
            }
        )*
    };
}

database_error!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError,
);

/// Persistent task store.
pub struct CacheStore {
    db: Database,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Open or create the store, creating `cache_dir` if needed.
    ///
    /// redb opens its file synchronously, so the directory is created the
    /// same way.
    #[allow(clippy::disallowed_methods)]
    pub fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(cache_dir)?;
        let db = Database::create(cache_dir.join("cache.redb"))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TASK_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TASK_TABLE)?;
        let value = table.get(key)?.ok_or(CacheError::CacheMiss)?;
        Ok(value.value().to_vec())
    }

    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TASK_TABLE)?;
            table.insert(key, bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let write_txn = self.db.begin_write()?;
        {
            write_txn.delete_table(TASK_TABLE)?;
            let _ = write_txn.open_table(TASK_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TASK_TABLE)?;
        Ok(table.iter()?.count())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_database_file() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("nested/cache");

        let _store = CacheStore::open(&cache_dir).unwrap();

        assert!(cache_dir.join("cache.redb").exists());
    }

    #[test]
    fn put_get_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();

        assert!(matches!(store.get("dist:abc"), Err(CacheError::CacheMiss)));

        store.put("dist:abc", b"payload").unwrap();
        assert_eq!(store.get("dist:abc").unwrap(), b"payload");
        assert_eq!(store.len().unwrap(), 1);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }
}
