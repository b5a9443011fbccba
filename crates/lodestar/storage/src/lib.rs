//! Lodestar storage abstractions.
//!
//! This crate defines the persistence contract consumed by the session
//! registry and the instruction queue:
//! - beacon records (keyed by session identity)
//! - queued tasks and their delivery state machine
//! - task outputs (at most one per task)
//!
//! Design stance:
//! - State transitions that race (claiming a pending task, marking sessions
//!   stale) are conditional updates inside the adapter, never read-then-write
//!   at the service layer.
//! - The in-memory adapter is the deterministic reference; PostgreSQL is the
//!   transactional production backend.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;
pub use traits::{AgentStore, CoordinatorStorage, QueryWindow, TaskStore};
