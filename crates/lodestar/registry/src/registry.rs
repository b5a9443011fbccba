//! Beacon lifecycle management over the agent store.

use crate::error::RegistryResult;
use chrono::{Duration, Utc};
use lodestar_storage::{AgentStore, QueryWindow};
use lodestar_types::{AgentRecord, AgentStatus, BeaconFingerprint, SessionId};
use std::sync::Arc;

/// Session registry service.
///
/// Holds no state of its own; every operation is a thin, explicitly-scoped
/// mutation of the injected store. Operations on different identities never
/// contend beyond the store's own row-level consistency.
pub struct BeaconRegistry {
    store: Arc<dyn AgentStore>,
}

impl BeaconRegistry {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }

    /// Handle a successful handshake: create the beacon record on first
    /// contact, refresh address/liveness on any later one. Idempotent; the
    /// identity is the natural key, so repeated handshakes cannot produce
    /// duplicate records.
    pub async fn register_or_refresh(
        &self,
        id: SessionId,
        remote_addr: &str,
        fingerprint: BeaconFingerprint,
    ) -> RegistryResult<AgentRecord> {
        let now = Utc::now();
        let record = self
            .store
            .upsert_agent(AgentRecord {
                id,
                remote_addr: remote_addr.to_string(),
                fingerprint: fingerprint.bounded(),
                status: AgentStatus::Active,
                first_seen: now,
                last_checkin: now,
            })
            .await?;

        tracing::info!(
            beacon = %id.short(),
            addr = %record.remote_addr,
            "beacon registered or refreshed"
        );
        Ok(record)
    }

    /// Refresh liveness after an authenticated request.
    ///
    /// A missing record means a symmetric session is alive in the crypto
    /// engine with no durable counterpart. That is recoverable (the beacon
    /// re-registers on its next handshake), so it is logged, not raised.
    pub async fn touch(&self, id: &SessionId) -> RegistryResult<()> {
        if !self.store.touch_agent(id, Utc::now()).await? {
            tracing::warn!(
                beacon = %id.short(),
                "live session has no matching beacon record"
            );
        }
        Ok(())
    }

    pub async fn get(&self, id: &SessionId) -> RegistryResult<Option<AgentRecord>> {
        Ok(self.store.get_agent(id).await?)
    }

    /// All beacon records, most recent check-in first.
    pub async fn list_all(&self, window: QueryWindow) -> RegistryResult<Vec<AgentRecord>> {
        Ok(self.store.list_agents(window).await?)
    }

    /// Demote every active beacon idle for longer than `threshold`.
    /// Deterministic and idempotent; safe to run concurrently with
    /// registration on other identities.
    pub async fn mark_stale(&self, threshold: Duration) -> RegistryResult<u64> {
        let cutoff = Utc::now() - threshold;
        let count = self.store.mark_stale(cutoff).await?;
        if count > 0 {
            tracing::info!(count, "marked idle beacons stale");
        }
        Ok(count)
    }
}
