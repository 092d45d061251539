//! In-memory store with compare-and-swap commits.
//!
//! Commits hold the store lock for the whole batch. Every check is validated
//! against the state before the batch, comparing version tokens exactly; only
//! when all checks hold are the sets and deletes applied, in staged order, all
//! stamped with one shared token. A failed check writes nothing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::kv::store::KvStore;
use crate::kv::types::{
    AtomicOperation, CheckFailure, KvEntry, KvError, KvKey, KvResult, VersionToken, WriteOutcome,
};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<KvKey, (Value, VersionToken)>,
    sequence: u64,
}

impl Inner {
    fn next_token(&mut self) -> VersionToken {
        self.sequence += 1;
        VersionToken::from_sequence(self.sequence)
    }

    fn validate(&self, key: &KvKey, expected: &Option<VersionToken>) -> KvResult<()> {
        let current = self.entries.get(key).map(|(_, token)| token);
        let reason = match (expected, current) {
            (None, None) => return Ok(()),
            (None, Some(_)) => CheckFailure::KeyExists,
            (Some(_), None) => CheckFailure::KeyMissing,
            (Some(expected), Some(actual)) if expected == actual => return Ok(()),
            (Some(expected), Some(actual)) => CheckFailure::VersionMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            },
        };
        Err(KvError::CheckFailed {
            key: key.clone(),
            reason,
        })
    }
}

#[derive(Debug, Default)]
pub struct TransactionalKv {
    inner: Mutex<Inner>,
}

impl TransactionalKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> KvResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| KvError::Backend("transactional store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KvStore for TransactionalKv {
    async fn get(&self, key: &KvKey) -> KvResult<KvEntry> {
        let inner = self.lock()?;
        Ok(match inner.entries.get(key) {
            Some((value, token)) => KvEntry {
                value: Some(value.clone()),
                version_token: Some(token.clone()),
            },
            None => KvEntry::absent(),
        })
    }

    async fn set(&self, key: KvKey, value: Value) -> KvResult<WriteOutcome> {
        let mut inner = self.lock()?;
        let version_token = inner.next_token();
        inner.entries.insert(key, (value, version_token.clone()));
        Ok(WriteOutcome {
            ok: true,
            version_token,
        })
    }

    async fn delete(&self, key: &KvKey) -> KvResult<WriteOutcome> {
        let mut inner = self.lock()?;
        let existed = inner.entries.remove(key).is_some();
        Ok(WriteOutcome {
            ok: existed,
            version_token: inner.next_token(),
        })
    }

    async fn commit(&self, operations: Vec<AtomicOperation>) -> KvResult<VersionToken> {
        let mut inner = self.lock()?;

        for operation in &operations {
            if let AtomicOperation::Check { key, version_token } = operation {
                inner.validate(key, version_token)?;
            }
        }

        let version_token = inner.next_token();
        for operation in operations {
            match operation {
                AtomicOperation::Check { .. } => {}
                AtomicOperation::Set { key, value } => {
                    inner.entries.insert(key, (value, version_token.clone()));
                }
                AtomicOperation::Delete { key } => {
                    inner.entries.remove(&key);
                }
            }
        }
        Ok(version_token)
    }

    fn backend_name(&self) -> &'static str {
        "transactional"
    }
}
