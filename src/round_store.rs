//! Finished-round history
//!
//! Records are written once at crash time and never modified. Reads are
//! newest first.

use crate::errors::StoreError;
use crate::game::types::FinishedRound;
use crate::storage::OptimizedStorage;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

const ROUND_RECORD_PREFIX: &str = "round:record:";
const RECENT_ROUNDS_PREFIX: &[u8] = b"round:index:recent:";

#[async_trait]
pub trait RoundStore: Send + Sync {
    async fn append(&self, record: &FinishedRound) -> Result<(), StoreError>;

    /// Up to `limit` records, most recent first
    async fn recent(&self, limit: usize) -> Result<Vec<FinishedRound>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<FinishedRound>, StoreError>;
}

fn round_record_key(id: &Uuid) -> Vec<u8> {
    format!("{}{}", ROUND_RECORD_PREFIX, id.simple()).into_bytes()
}

fn recent_round_index_key(id: &Uuid) -> Vec<u8> {
    // Round ids are time-ordered; inverting every byte sorts newest first.
    // Key layout: prefix | !id_bytes
    let mut key = Vec::with_capacity(RECENT_ROUNDS_PREFIX.len() + 16);
    key.extend_from_slice(RECENT_ROUNDS_PREFIX);
    key.extend(id.as_bytes().iter().map(|b| !b));
    key
}

fn id_from_index_key(key: &[u8]) -> Option<Uuid> {
    let raw = key.strip_prefix(RECENT_ROUNDS_PREFIX)?;
    let bytes: [u8; 16] = raw.try_into().ok()?;
    Some(Uuid::from_bytes(bytes.map(|b| !b)))
}

pub struct RocksRoundStore {
    storage: OptimizedStorage,
}

impl RocksRoundStore {
    pub fn new(storage: OptimizedStorage) -> Self {
        Self { storage }
    }

    fn load(&self, id: &Uuid) -> Result<Option<FinishedRound>, StoreError> {
        let Some(bytes) = self.storage.get(&round_record_key(id))? else {
            return Ok(None);
        };

        let record = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::CorruptedData(format!("Failed to decode round {}: {}", id, e))
        })?;
        Ok(Some(record))
    }
}

#[async_trait]
impl RoundStore for RocksRoundStore {
    async fn append(&self, record: &FinishedRound) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record).map_err(|e| {
            StoreError::WriteFailed(format!("Failed to encode round {}: {}", record.id, e))
        })?;

        self.storage.batch_write(&[
            (round_record_key(&record.id), bytes),
            (recent_round_index_key(&record.id), Vec::new()),
        ])
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FinishedRound>, StoreError> {
        let rows = self.storage.scan_prefix(RECENT_ROUNDS_PREFIX, limit)?;

        let mut records = Vec::with_capacity(rows.len());
        for (key, _) in rows {
            let Some(id) = id_from_index_key(&key) else {
                tracing::warn!(key_len = key.len(), "skipping malformed round index key");
                continue;
            };
            match self.load(&id)? {
                Some(record) => records.push(record),
                None => tracing::warn!(round_id = %id, "round index points at missing record"),
            }
        }
        Ok(records)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FinishedRound>, StoreError> {
        self.load(&id)
    }
}

/// Bounded in-process history
pub struct InMemoryRoundStore {
    records: RwLock<VecDeque<FinishedRound>>,
    capacity: usize,
}

impl InMemoryRoundStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for InMemoryRoundStore {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl RoundStore for InMemoryRoundStore {
    async fn append(&self, record: &FinishedRound) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.push_front(record.clone());
        records.truncate(self.capacity);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FinishedRound>, StoreError> {
        Ok(self.records.read().await.iter().take(limit).cloned().collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FinishedRound>, StoreError> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }
}
