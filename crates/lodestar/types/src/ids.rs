//! Strongly-typed identifiers for Lodestar entities.
//!
//! A `SessionId` is not random: it is derived as a one-way hash of a
//! session's symmetric key, so the same key material always resolves to the
//! same identity. It serves three roles at once: key into the in-memory
//! cipher table, primary key of the durable beacon record, and the cleartext
//! routing tag trailing every sealed envelope.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a session identity in bytes (64 hex characters rendered).
pub const SESSION_ID_LEN: usize = 32;

/// Errors produced when parsing identifiers from external input.
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("session id must be {SESSION_ID_LEN} bytes, got {0}")]
    BadLength(usize),

    #[error("session id is not valid hex: {0}")]
    BadHex(String),
}

/// Durable identity of one beacon session.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    pub fn from_bytes(bytes: [u8; SESSION_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a raw byte slice, e.g. the trailing segment of an envelope.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdParseError> {
        let arr: [u8; SESSION_ID_LEN] = bytes
            .try_into()
            .map_err(|_| IdParseError::BadLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Parse from the 64-character hex form used in storage and operator APIs.
    pub fn from_hex(raw: &str) -> Result<Self, IdParseError> {
        let bytes = hex::decode(raw).map_err(|e| IdParseError::BadHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short display form (first 8 hex characters), for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.short())
    }
}

impl FromStr for SessionId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Numeric identifier of a queued task. Assigned by storage, monotonically
/// increasing per deployment, which is what gives FIFO its tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}
