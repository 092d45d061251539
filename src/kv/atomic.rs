//! Atomic batch staging.
//!
//! Operations are staged in call order and handed to the store's `commit` as a
//! unit. Failures are reported through `CommitOutcome::ok`, never raised, so
//! callers must inspect the outcome.

use serde_json::Value;

use crate::kv::store::KvStore;
use crate::kv::types::{AtomicOperation, CommitOutcome, KvKey, VersionToken};
use crate::observability::metrics;

/// Builder for one atomic batch.
pub struct AtomicBatch<'a> {
    store: &'a dyn KvStore,
    operations: Vec<AtomicOperation>,
}

impl<'a> AtomicBatch<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self {
            store,
            operations: Vec::new(),
        }
    }

    /// Require `key` to be absent (`None`) or present (`Some`).
    pub fn check(mut self, key: impl Into<KvKey>, version_token: Option<VersionToken>) -> Self {
        self.operations.push(AtomicOperation::Check {
            key: key.into(),
            version_token,
        });
        self
    }

    pub fn set(mut self, key: impl Into<KvKey>, value: impl Into<Value>) -> Self {
        self.operations.push(AtomicOperation::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(mut self, key: impl Into<KvKey>) -> Self {
        self.operations.push(AtomicOperation::Delete { key: key.into() });
        self
    }

    pub fn operations(&self) -> &[AtomicOperation] {
        &self.operations
    }

    pub async fn commit(self) -> CommitOutcome {
        let backend = self.store.backend_name();
        let staged = self.operations.len();

        match self.store.commit(self.operations).await {
            Ok(version_token) => {
                metrics::record_kv_commit(backend, true);
                tracing::debug!(backend, staged, version = %version_token, "Atomic batch committed");
                CommitOutcome {
                    ok: true,
                    version_token: Some(version_token),
                }
            }
            Err(e) => {
                metrics::record_kv_commit(backend, false);
                tracing::warn!(backend, staged, error = %e, "Atomic operation failed");
                CommitOutcome {
                    ok: false,
                    version_token: None,
                }
            }
        }
    }
}
