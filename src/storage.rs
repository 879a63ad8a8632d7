//! Optimized storage layer using RocksDB
//!
//! Shared by the persistent ledger and the finished-round store. Values are
//! opaque bytes here; callers own their key prefixes and encodings.

use crate::config::StorageConfig;
use crate::errors::StoreError;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
}

impl OptimizedStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StoreError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open the database described by `config`, wiping it first when
    /// `clear_on_start` is set
    pub fn new_with_config(config: &StorageConfig) -> Result<Self, StoreError> {
        let path = Path::new(&config.data_directory);
        if config.clear_on_start && path.exists() {
            tracing::warn!(path = %path.display(), "🧹 Clearing data directory on start");
            std::fs::remove_dir_all(path)
                .map_err(|e| StoreError::DatabaseOpenFailed(e.to_string()))?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::DatabaseOpenFailed(e.to_string()))?;
        }
        Self::new(path)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key)
            .map_err(|e| StoreError::ReadFailed(e.to_string()))
    }

    /// Write all pairs atomically
    pub fn batch_write<K, V>(&self, items: &[(K, V)]) -> Result<(), StoreError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        self.db.write(batch).map_err(StoreError::from)
    }

    /// Up to `limit` entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            if out.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(|e| StoreError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }

        Ok(out)
    }
}
