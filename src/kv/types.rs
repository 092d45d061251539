//! Key-value types and error definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One component of a composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Bool(bool),
    Int(i64),
    String(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::String(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::String(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(value.into())
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(value.into())
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

/// Ordered composite key. Equality is structural: same parts, same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KvKey(Vec<KeyPart>);

impl KvKey {
    pub fn new<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn from_parts(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    pub fn push(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl<P: Into<KeyPart>, const N: usize> From<[P; N]> for KvKey {
    fn from(parts: [P; N]) -> Self {
        Self::new(parts)
    }
}

impl From<Vec<KeyPart>> for KvKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for KvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

/// Build a `KvKey` from mixed part types: `kv_key!["session", 42]`.
#[macro_export]
macro_rules! kv_key {
    ($($part:expr),* $(,)?) => {
        $crate::kv::KvKey::from_parts(vec![$($crate::kv::KeyPart::from($part)),*])
    };
}

/// Opaque marker of one write. Tokens from the same store sort in write order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self(format!("{:020x}", sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a read. Both fields are `None` exactly when the key is absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KvEntry {
    pub value: Option<Value>,
    pub version_token: Option<VersionToken>,
}

impl KvEntry {
    pub fn absent() -> Self {
        Self {
            value: None,
            version_token: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.version_token.is_some()
    }
}

/// Result of `set` and `delete`.
///
/// `ok` is always true for `set`; for `delete` it tells whether the key existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub ok: bool,
    pub version_token: VersionToken,
}

/// Result of an atomic commit. A failed commit carries no token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub ok: bool,
    pub version_token: Option<VersionToken>,
}

/// One staged step of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicOperation {
    /// `None` requires the key to be absent; `Some` requires it to be present.
    Check {
        key: KvKey,
        version_token: Option<VersionToken>,
    },
    Set {
        key: KvKey,
        value: Value,
    },
    Delete {
        key: KvKey,
    },
}

/// Why a staged check did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    KeyExists,
    KeyMissing,
    VersionMismatch {
        expected: VersionToken,
        actual: VersionToken,
    },
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckFailure::KeyExists => f.write_str("key already exists"),
            CheckFailure::KeyMissing => f.write_str("key not found"),
            CheckFailure::VersionMismatch { expected, actual } => {
                write!(f, "version mismatch: expected {}, found {}", expected, actual)
            }
        }
    }
}

/// Errors that can occur during key-value operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("check failed for {key}: {reason}")]
    CheckFailed { key: KvKey, reason: CheckFailure },

    #[error("store error: {0}")]
    Backend(String),
}

/// Result type for key-value operations.
pub type KvResult<T> = Result<T, KvError>;
