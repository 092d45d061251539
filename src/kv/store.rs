//! The key-value capability every backend implements.

use async_trait::async_trait;
use serde_json::Value;

use crate::kv::atomic::AtomicBatch;
use crate::kv::types::{AtomicOperation, KvEntry, KvKey, KvResult, VersionToken, WriteOutcome};

/// An interface that must be implemented by every key-value backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. Absent keys yield `KvEntry::absent()`.
    async fn get(&self, key: &KvKey) -> KvResult<KvEntry>;

    /// Unconditional upsert with a fresh version token.
    async fn set(&self, key: KvKey, value: Value) -> KvResult<WriteOutcome>;

    /// Remove a key; `ok` reports whether it existed.
    async fn delete(&self, key: &KvKey) -> KvResult<WriteOutcome>;

    /// Apply staged operations in order. `Err` means the batch did not commit.
    async fn commit(&self, operations: Vec<AtomicOperation>) -> KvResult<VersionToken>;

    /// Short backend name for logs and metrics.
    fn backend_name(&self) -> &'static str;
}

impl dyn KvStore {
    /// Start staging an atomic batch against this store.
    pub fn atomic(&self) -> AtomicBatch<'_> {
        AtomicBatch::new(self)
    }
}
