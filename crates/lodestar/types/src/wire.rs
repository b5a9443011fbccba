//! JSON payloads exchanged with beacons.
//!
//! The handshake bodies travel in plaintext; everything else is the decrypted
//! interior of a sealed envelope. Transport framing (headers vs. body) is the
//! HTTP layer's concern, not modelled here.

use crate::agent::BeaconFingerprint;
use crate::ids::TaskId;
use crate::task::Task;
use serde::{Deserialize, Serialize};

/// First contact: the beacon offers its public key and a host fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    /// Base64-encoded 32-byte curve point.
    pub public_key: String,

    #[serde(default)]
    pub metadata: BeaconFingerprint,
}

/// Handshake reply carrying the coordinator's public key. The session
/// identity itself is never transmitted; both sides derive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    /// Base64-encoded 32-byte curve point.
    pub public_key: String,

    pub status: String,
}

impl HandshakeResponse {
    pub fn ok(public_key: String) -> Self {
        Self {
            public_key,
            status: "ok".to_string(),
        }
    }
}

/// Authenticated request body: one sealed envelope, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub envelope: String,
}

/// Authenticated response body: one sealed envelope, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinResponse {
    pub envelope: String,
}

/// Decrypted interior of a beacon check-in: either the result of the
/// previously delivered task, or a bare liveness ping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckinPayload {
    Report {
        #[serde(rename = "instructionId")]
        instruction_id: TaskId,
        output: String,
    },
    Ping {
        ping: bool,
    },
}

/// Decrypted interior of the coordinator's reply: the next instruction, or
/// an idle directive telling the beacon how long to sleep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Directive {
    Execute {
        command: String,
        #[serde(rename = "instructionId")]
        instruction_id: TaskId,
        arguments: String,
    },
    Idle {
        command: String,
        #[serde(rename = "intervalSeconds")]
        interval_seconds: u64,
    },
}

impl Directive {
    pub fn execute(task: &Task) -> Self {
        Self::Execute {
            command: task.command.clone(),
            instruction_id: task.id,
            arguments: task.arguments.clone(),
        }
    }

    pub fn idle(interval_seconds: u64) -> Self {
        Self::Idle {
            command: "idle".to_string(),
            interval_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkin_payload_distinguishes_report_from_ping() {
        let report: CheckinPayload =
            serde_json::from_str(r#"{"instructionId": 3, "output": "root"}"#).unwrap();
        assert!(matches!(
            report,
            CheckinPayload::Report { instruction_id: TaskId(3), .. }
        ));

        let ping: CheckinPayload = serde_json::from_str(r#"{"ping": true}"#).unwrap();
        assert!(matches!(ping, CheckinPayload::Ping { ping: true }));
    }

    #[test]
    fn idle_directive_wire_shape() {
        let json = serde_json::to_value(Directive::idle(10)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"command": "idle", "intervalSeconds": 10})
        );
    }

    #[test]
    fn execute_directive_wire_shape() {
        let directive = Directive::Execute {
            command: "whoami".to_string(),
            instruction_id: TaskId(1),
            arguments: String::new(),
        };
        let json = serde_json::to_value(directive).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"command": "whoami", "instructionId": 1, "arguments": ""})
        );
    }
}
