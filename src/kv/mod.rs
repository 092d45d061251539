//! Key-value storage subsystem.
//!
//! # Data Flow
//! ```text
//! startup: KvConfig.backend
//!     → open_store() → Arc<dyn KvStore> (created once, injected into AppState)
//!
//! callers:
//!     → get / set / delete            (direct operations)
//!     → atomic().check().set().commit() (atomic.rs stages, backend commits)
//! ```
//!
//! # Design Decisions
//! - Backends are chosen by configuration, never by probing the environment
//! - `memory` keeps the weak sequential commit; `transactional` validates then applies
//! - `memory` evaluates a check against the state left by earlier staged operations;
//!   `transactional` evaluates every check against the state before the batch
//! - Nothing is persisted; every restart starts empty

pub mod atomic;
pub mod memory;
pub mod store;
pub mod transactional;
pub mod types;

use std::sync::Arc;

use crate::config::{KvBackend, KvConfig};

pub use atomic::AtomicBatch;
pub use memory::MemoryKv;
pub use store::KvStore;
pub use transactional::TransactionalKv;
pub use types::{
    AtomicOperation, CheckFailure, CommitOutcome, KeyPart, KvEntry, KvError, KvKey, KvResult,
    VersionToken, WriteOutcome,
};

/// Shared handle to the process-wide store.
pub type SharedKv = Arc<dyn KvStore>;

/// Construct the configured backend.
pub fn open_store(config: &KvConfig) -> SharedKv {
    let store: SharedKv = match config.backend {
        KvBackend::Memory => Arc::new(MemoryKv::new()),
        KvBackend::Transactional => Arc::new(TransactionalKv::new()),
    };
    tracing::info!(backend = store.backend_name(), "Using in-memory KV storage");
    store
}
