//! In-memory fallback store.
//!
//! # Commit semantics
//! Batches are applied one operation at a time in staged order:
//! - `Check { version_token: None }` fails if the key is present
//! - `Check { version_token: Some(_) }` fails if the key is absent; the token
//!   value itself is not compared
//! - a failed check stops the batch, but sets and deletes staged before it
//!   stay applied (there is no rollback)
//!
//! Other callers can interleave between operations of a batch. Use
//! `TransactionalKv` when a batch must validate fully before anything is written.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::kv::store::KvStore;
use crate::kv::types::{
    AtomicOperation, CheckFailure, KvEntry, KvError, KvKey, KvResult, VersionToken, WriteOutcome,
};

#[derive(Debug, Clone)]
struct Stored {
    value: Value,
    version_token: VersionToken,
}

/// Process-lifetime store: no eviction, no persistence, no size bound.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<KvKey, Stored>,
    sequence: AtomicU64,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_token(&self) -> VersionToken {
        VersionToken::from_sequence(self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn check(&self, key: &KvKey, expected: &Option<VersionToken>) -> KvResult<()> {
        let present = self.entries.contains_key(key);
        let reason = match (expected, present) {
            (None, true) => CheckFailure::KeyExists,
            (Some(_), false) => CheckFailure::KeyMissing,
            _ => return Ok(()),
        };
        Err(KvError::CheckFailed {
            key: key.clone(),
            reason,
        })
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &KvKey) -> KvResult<KvEntry> {
        Ok(match self.entries.get(key) {
            Some(stored) => KvEntry {
                value: Some(stored.value.clone()),
                version_token: Some(stored.version_token.clone()),
            },
            None => KvEntry::absent(),
        })
    }

    async fn set(&self, key: KvKey, value: Value) -> KvResult<WriteOutcome> {
        let version_token = self.next_token();
        self.entries.insert(
            key,
            Stored {
                value,
                version_token: version_token.clone(),
            },
        );
        Ok(WriteOutcome {
            ok: true,
            version_token,
        })
    }

    async fn delete(&self, key: &KvKey) -> KvResult<WriteOutcome> {
        let existed = self.entries.remove(key).is_some();
        Ok(WriteOutcome {
            ok: existed,
            version_token: self.next_token(),
        })
    }

    async fn commit(&self, operations: Vec<AtomicOperation>) -> KvResult<VersionToken> {
        for operation in operations {
            match operation {
                AtomicOperation::Check { key, version_token } => self.check(&key, &version_token)?,
                AtomicOperation::Set { key, value } => {
                    self.set(key, value).await?;
                }
                AtomicOperation::Delete { key } => {
                    self.delete(&key).await?;
                }
            }
        }
        Ok(self.next_token())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
