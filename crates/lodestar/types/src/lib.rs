//! Lodestar core types.
//!
//! This crate defines the vocabulary shared by every Lodestar component:
//!
//! - **SessionId / TaskId**: strongly-typed identifiers
//! - **AgentRecord**: the durable view of one beacon session
//! - **Task / TaskOutput**: the instruction queue entities
//! - **wire**: the JSON payloads exchanged with beacons
//!
//! Nothing in here performs I/O; the crate exists so that the crypto engine,
//! the registry, the queue and the HTTP boundary agree on one data model.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod agent;
pub mod ids;
pub mod task;
pub mod wire;

pub use agent::{AgentRecord, AgentStatus, BeaconFingerprint};
pub use ids::{IdParseError, SessionId, TaskId, SESSION_ID_LEN};
pub use task::{NewTask, Task, TaskOutput, TaskStatus};
pub use wire::{
    CheckinPayload, CheckinRequest, CheckinResponse, Directive, HandshakeRequest,
    HandshakeResponse,
};
