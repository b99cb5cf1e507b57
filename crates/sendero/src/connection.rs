//! Live connection contract and an in-memory loopback client.
//!
//! The real transport (an industrial data-access client) is out of scope;
//! the engine only depends on the read/write seam defined here. The
//! [`LoopbackConnection`] stands in for development and testing without
//! live equipment.

use crate::result::{SenderoError, SenderoResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// A value read from or written to a live tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Numeric process value or setpoint
    Float(f64),
    /// Named-set member, mode string or prompt response
    Text(String),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A read result: value plus quality status and server timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadValue {
    /// The value read
    pub value: Value,
    /// Quality/status string as reported by the server
    pub status: String,
    /// Server timestamp of the read
    pub timestamp: DateTime<Utc>,
}

impl ReadValue {
    /// Create a read result stamped with the current time
    #[must_use]
    pub fn now(value: Value, status: impl Into<String>) -> Self {
        Self {
            value,
            status: status.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Read/write seam onto the live system.
///
/// Implementations must be shareable across concurrently running test
/// administrators; the engine performs no serialization of its own, so
/// overlapping tag access from concurrent cases races (see `TestAdmin`).
pub trait Connection: Send + Sync {
    /// Read the value at a tag path
    fn read(&self, path: &str) -> SenderoResult<ReadValue>;

    /// Write a value to a tag path
    fn write(&self, path: &str, value: Value) -> SenderoResult<()>;
}

/// Value returned by [`LoopbackConnection`] for paths never written
const LOOPBACK_DEFAULT: f64 = -99.0;

/// In-memory connection for development without live communications.
///
/// Writes land in a path map; reads return the last written value or a
/// sentinel default, so write-then-read loopback tests work offline.
pub struct LoopbackConnection {
    tags: Mutex<HashMap<String, Value>>,
}

impl std::fmt::Debug for LoopbackConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackConnection").finish_non_exhaustive()
    }
}

impl Default for LoopbackConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackConnection {
    /// Create an empty loopback connection
    #[must_use]
    pub fn new() -> Self {
        Self {
            tags: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-seed a tag value, e.g. to fake live process conditions in tests
    pub fn seed(&self, path: impl Into<String>, value: Value) {
        self.lock_tags().insert(path.into(), value);
    }

    /// Snapshot of the current value at a path, if any was written
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        self.lock_tags().get(path).cloned()
    }

    fn lock_tags(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned map only means another test thread panicked mid-write;
        // the loopback data itself stays usable.
        self.tags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Connection for LoopbackConnection {
    fn read(&self, path: &str) -> SenderoResult<ReadValue> {
        let value = self
            .lock_tags()
            .get(path)
            .cloned()
            .unwrap_or(Value::Float(LOOPBACK_DEFAULT));
        debug!(path, %value, "loopback read");
        Ok(ReadValue::now(value, "Loopback"))
    }

    fn write(&self, path: &str, value: Value) -> SenderoResult<()> {
        debug!(path, %value, "loopback write");
        self.lock_tags().insert(path.to_string(), value);
        Ok(())
    }
}

/// Connection that fails every operation, for exercising error paths
#[derive(Debug, Default)]
pub struct DeadConnection;

impl Connection for DeadConnection {
    fn read(&self, path: &str) -> SenderoResult<ReadValue> {
        Err(SenderoError::Connection {
            path: path.to_string(),
            message: "connection is down".to_string(),
        })
    }

    fn write(&self, path: &str, _value: Value) -> SenderoResult<()> {
        Err(SenderoError::Connection {
            path: path.to_string(),
            message: "connection is down".to_string(),
        })
    }
}
