//! Request orchestration.

use crate::error::{ChannelError, ChannelResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lodestar_crypto::{CryptoError, SessionCrypto};
use lodestar_registry::BeaconRegistry;
use lodestar_tasking::{TaskQueue, TaskingError};
use lodestar_types::{
    CheckinPayload, CheckinRequest, CheckinResponse, Directive, HandshakeRequest,
    HandshakeResponse, SessionId,
};
use std::sync::Arc;

/// Channel protocol service.
pub struct ChannelService {
    crypto: Arc<SessionCrypto>,
    registry: Arc<BeaconRegistry>,
    queue: Arc<TaskQueue>,
    /// Sleep interval handed to beacons with no pending work.
    idle_interval_secs: u64,
}

impl ChannelService {
    pub fn new(
        crypto: Arc<SessionCrypto>,
        registry: Arc<BeaconRegistry>,
        queue: Arc<TaskQueue>,
        idle_interval_secs: u64,
    ) -> Self {
        Self {
            crypto,
            registry,
            queue,
            idle_interval_secs,
        }
    }

    /// Complete a key exchange and register the resulting identity.
    ///
    /// The reply carries only the coordinator's public key; the session
    /// identity is never transmitted, both sides derive it independently.
    pub async fn handshake(
        &self,
        request: HandshakeRequest,
        remote_addr: &str,
    ) -> ChannelResult<HandshakeResponse> {
        let peer_key = BASE64
            .decode(&request.public_key)
            .map_err(|_| ChannelError::InvalidHandshake("public key is not valid base64".into()))?;

        let id = self.crypto.complete_handshake(&peer_key).map_err(|e| match e {
            CryptoError::InvalidPeerKey => {
                ChannelError::InvalidHandshake("public key is not a valid curve point".into())
            }
            other => ChannelError::Internal(other.to_string()),
        })?;

        self.registry
            .register_or_refresh(id, remote_addr, request.metadata)
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()))?;

        Ok(HandshakeResponse::ok(BASE64.encode(self.crypto.public_key())))
    }

    /// One authenticated round-trip: open the envelope, record any reported
    /// result, refresh liveness, and seal the next directive.
    ///
    /// An envelope that fails to authenticate or names no live session never
    /// reaches the registry or the queue.
    pub async fn process(&self, request: CheckinRequest) -> ChannelResult<CheckinResponse> {
        let raw = BASE64
            .decode(&request.envelope)
            .map_err(|_| ChannelError::Malformed)?;

        let (plaintext, id) = self.crypto.open(&raw).map_err(|e| match e {
            CryptoError::MalformedEnvelope { .. } => ChannelError::Malformed,
            CryptoError::UnknownSession(_) | CryptoError::AuthenticationFailed(_) => {
                ChannelError::Unauthenticated
            }
            other => ChannelError::Internal(other.to_string()),
        })?;

        // Result recording is sequenced strictly before the next claim, so a
        // beacon never receives new work while its report is still unwritten.
        match serde_json::from_slice::<CheckinPayload>(&plaintext) {
            Ok(CheckinPayload::Report {
                instruction_id,
                output,
            }) => match self.queue.record_result(instruction_id, output).await {
                Ok(()) | Err(TaskingError::UnknownTask(_)) => {
                    // Already logged by the queue; the session itself is
                    // healthy, so the round-trip continues.
                }
                Err(e) => return Err(ChannelError::Internal(e.to_string())),
            },
            Ok(CheckinPayload::Ping { .. }) => {}
            Err(_) => {
                tracing::warn!(beacon = %id.short(), "undecodable check-in payload, treating as ping");
            }
        }

        self.registry
            .touch(&id)
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()))?;

        let directive = match self
            .queue
            .next_task(&id)
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()))?
        {
            Some(task) => Directive::execute(&task),
            None => Directive::idle(self.idle_interval_secs),
        };

        self.seal_directive(&id, &directive)
    }

    fn seal_directive(
        &self,
        id: &SessionId,
        directive: &Directive,
    ) -> ChannelResult<CheckinResponse> {
        let body =
            serde_json::to_vec(directive).map_err(|e| ChannelError::Internal(e.to_string()))?;
        let sealed = self.crypto.seal(id, &body).map_err(|e| match e {
            // The session vanished between open and seal; only a restart
            // race can do this, and the beacon recovers by re-handshaking.
            CryptoError::UnknownSession(_) => ChannelError::Unauthenticated,
            other => ChannelError::Internal(other.to_string()),
        })?;

        Ok(CheckinResponse {
            envelope: BASE64.encode(sealed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lodestar_storage::{InMemoryStorage, QueryWindow, TaskStore};
    use lodestar_types::{AgentStatus, BeaconFingerprint, TaskId, TaskStatus};

    struct Harness {
        channel: ChannelService,
        registry: Arc<BeaconRegistry>,
        queue: Arc<TaskQueue>,
        storage: Arc<InMemoryStorage>,
    }

    fn harness() -> Harness {
        let storage = Arc::new(InMemoryStorage::new());
        let registry = Arc::new(BeaconRegistry::new(storage.clone()));
        let queue = Arc::new(TaskQueue::new(storage.clone(), storage.clone()));
        let crypto = Arc::new(SessionCrypto::generate());
        let channel = ChannelService::new(crypto, registry.clone(), queue.clone(), 10);
        Harness {
            channel,
            registry,
            queue,
            storage,
        }
    }

    /// A beacon-side endpoint: its own engine plus the identity both sides
    /// derived during the handshake.
    struct Beacon {
        crypto: SessionCrypto,
        id: SessionId,
    }

    impl Beacon {
        async fn connect(harness: &Harness) -> Self {
            let crypto = SessionCrypto::generate();
            let response = harness
                .channel
                .handshake(
                    HandshakeRequest {
                        public_key: BASE64.encode(crypto.public_key()),
                        metadata: BeaconFingerprint {
                            hostname: Some("web-01".to_string()),
                            username: Some("svc-backup".to_string()),
                            ..Default::default()
                        },
                    },
                    "203.0.113.7:4444",
                )
                .await
                .unwrap();

            let server_key = BASE64.decode(&response.public_key).unwrap();
            let id = crypto.complete_handshake(&server_key).unwrap();
            Self { crypto, id }
        }

        fn checkin(&self, payload: &CheckinPayload) -> CheckinRequest {
            let body = serde_json::to_vec(payload).unwrap();
            CheckinRequest {
                envelope: BASE64.encode(self.crypto.seal(&self.id, &body).unwrap()),
            }
        }

        fn decrypt(&self, response: &CheckinResponse) -> Directive {
            let raw = BASE64.decode(&response.envelope).unwrap();
            let (plaintext, id) = self.crypto.open(&raw).unwrap();
            assert_eq!(id, self.id);
            serde_json::from_slice(&plaintext).unwrap()
        }
    }

    #[tokio::test]
    async fn full_delivery_cycle() {
        let harness = harness();
        let beacon = Beacon::connect(&harness).await;

        // The handshake registered a durable record under the derived id.
        let record = harness.registry.get(&beacon.id).await.unwrap().unwrap();
        assert_eq!(record.status, AgentStatus::Active);
        assert_eq!(record.fingerprint.hostname.as_deref(), Some("web-01"));

        let task = harness
            .queue
            .enqueue(beacon.id, "whoami".to_string(), String::new())
            .await
            .unwrap();

        // Ping in, instruction out.
        let response = harness
            .channel
            .process(beacon.checkin(&CheckinPayload::Ping { ping: true }))
            .await
            .unwrap();
        match beacon.decrypt(&response) {
            Directive::Execute {
                command,
                instruction_id,
                ..
            } => {
                assert_eq!(command, "whoami");
                assert_eq!(instruction_id, task.id);
            }
            other => panic!("expected an instruction, got {other:?}"),
        }

        // Report in, idle out.
        let response = harness
            .channel
            .process(beacon.checkin(&CheckinPayload::Report {
                instruction_id: task.id,
                output: "root".to_string(),
            }))
            .await
            .unwrap();
        match beacon.decrypt(&response) {
            Directive::Idle {
                command,
                interval_seconds,
            } => {
                assert_eq!(command, "idle");
                assert_eq!(interval_seconds, 10);
            }
            other => panic!("expected idle, got {other:?}"),
        }

        let stored = harness.storage.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        let output = harness.storage.get_output(task.id).await.unwrap().unwrap();
        assert_eq!(output.output, "root");
    }

    #[tokio::test]
    async fn unknown_identity_leaves_no_trace() {
        let harness = harness();
        let _known = Beacon::connect(&harness).await;

        // An envelope from a pair of engines that never handshaked with the
        // coordinator: structurally valid, identity unknown.
        let stranger = SessionCrypto::generate();
        let other = SessionCrypto::generate();
        let foreign_id = stranger.complete_handshake(&other.public_key()).unwrap();
        let foreign = stranger.seal(&foreign_id, br#"{"ping":true}"#).unwrap();

        let before = harness
            .registry
            .list_all(QueryWindow::default())
            .await
            .unwrap();
        let err = harness
            .channel
            .process(CheckinRequest {
                envelope: BASE64.encode(foreign),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Unauthenticated));

        let after = harness
            .registry
            .list_all(QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(before, after, "failed authentication must not mutate state");
    }

    #[tokio::test]
    async fn tampered_envelope_is_rejected() {
        let harness = harness();
        let beacon = Beacon::connect(&harness).await;

        let request = beacon.checkin(&CheckinPayload::Ping { ping: true });
        let mut raw = BASE64.decode(&request.envelope).unwrap();
        raw[14] ^= 0x01;

        let err = harness
            .channel
            .process(CheckinRequest {
                envelope: BASE64.encode(raw),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Unauthenticated));
    }

    #[tokio::test]
    async fn truncated_envelope_is_malformed_not_authenticated() {
        let harness = harness();
        let err = harness
            .channel
            .process(CheckinRequest {
                envelope: BASE64.encode([0u8; 59]),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Malformed));
    }

    #[tokio::test]
    async fn stale_beacon_revives_on_next_checkin() {
        let harness = harness();
        let beacon = Beacon::connect(&harness).await;

        harness
            .registry
            .mark_stale(Duration::seconds(-1))
            .await
            .unwrap();
        let record = harness.registry.get(&beacon.id).await.unwrap().unwrap();
        assert_eq!(record.status, AgentStatus::Stale);

        harness
            .channel
            .process(beacon.checkin(&CheckinPayload::Ping { ping: true }))
            .await
            .unwrap();
        let record = harness.registry.get(&beacon.id).await.unwrap().unwrap();
        assert_eq!(record.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn report_for_unknown_task_still_yields_a_directive() {
        let harness = harness();
        let beacon = Beacon::connect(&harness).await;

        let response = harness
            .channel
            .process(beacon.checkin(&CheckinPayload::Report {
                instruction_id: TaskId(404),
                output: "orphan".to_string(),
            }))
            .await
            .unwrap();
        assert!(matches!(beacon.decrypt(&response), Directive::Idle { .. }));
        assert!(harness
            .storage
            .get_output(TaskId(404))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn undecodable_payload_counts_as_a_ping() {
        let harness = harness();
        let beacon = Beacon::connect(&harness).await;

        let body = b"not json at all";
        let request = CheckinRequest {
            envelope: BASE64.encode(beacon.crypto.seal(&beacon.id, body).unwrap()),
        };
        let response = harness.channel.process(request).await.unwrap();
        assert!(matches!(beacon.decrypt(&response), Directive::Idle { .. }));
    }

    #[tokio::test]
    async fn handshake_rejects_garbage_keys() {
        let harness = harness();

        let err = harness
            .channel
            .handshake(
                HandshakeRequest {
                    public_key: "%%not-base64%%".to_string(),
                    metadata: Default::default(),
                },
                "203.0.113.7:4444",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidHandshake(_)));

        let err = harness
            .channel
            .handshake(
                HandshakeRequest {
                    public_key: BASE64.encode([0u8; 16]),
                    metadata: Default::default(),
                },
                "203.0.113.7:4444",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidHandshake(_)));
    }
}
