//! Beacon session records.

use crate::ids::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on free-form fingerprint entries kept per beacon.
pub const MAX_FINGERPRINT_EXTRA: usize = 16;

/// Lifecycle status of a beacon session.
///
/// `Active --(idle past threshold)--> Stale --(authenticated request)--> Active`.
/// There is no terminal state; records are only removed by operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Stale,
}

/// Host environment reported by a beacon at handshake time.
///
/// Named fields cover what the coordinator actually displays; anything else a
/// beacon wants to report goes into `extra`, which is truncated rather than
/// allowed to grow into an unbounded ad hoc schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconFingerprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl BeaconFingerprint {
    /// Enforce the extension-map bound. BTreeMap ordering makes the
    /// truncation deterministic.
    pub fn bounded(mut self) -> Self {
        while self.extra.len() > MAX_FINGERPRINT_EXTRA {
            let last = self.extra.keys().next_back().cloned();
            if let Some(key) = last {
                self.extra.remove(&key);
            }
        }
        self
    }
}

/// Durable record of one beacon session, keyed by its derived identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: SessionId,

    /// Last observed network address of the beacon.
    pub remote_addr: String,

    pub fingerprint: BeaconFingerprint,

    pub status: AgentStatus,

    /// Set at first registration, never refreshed afterwards.
    pub first_seen: DateTime<Utc>,

    pub last_checkin: DateTime<Utc>,
}
