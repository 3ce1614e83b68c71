//! RocksDB-backed [`KvBackend`].
//!
//! All mutations go through an atomic [`WriteBatch`] so a commit either
//! lands in full or not at all.

use std::path::Path;

use rocksdb::{Options, WriteBatch, DB};

use crate::error::DbError;
use crate::txdb::KvBackend;

pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref()).map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    /// Flush in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), DbError> {
        self.db.flush().map_err(|e| DbError::Backend(e.to_string()))
    }
}

impl KvBackend for RocksBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        self.db.get(key).map_err(|e| DbError::Backend(e.to_string()))
    }

    fn apply(&mut self, batch: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> Result<(), DbError> {
        let mut write_batch = WriteBatch::default();
        for (key, value) in batch {
            match value {
                Some(v) => write_batch.put(key, v),
                None => write_batch.delete(key),
            }
        }
        self.db
            .write(write_batch)
            .map_err(|e| DbError::Backend(e.to_string()))
    }

    fn scan_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), DbError>,
    ) -> Result<(), DbError> {
        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item.map_err(|e| DbError::Backend(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            f(&key, &value)?;
        }
        Ok(())
    }
}
