//! Instruction queue entities.

use crate::ids::{SessionId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery state of a queued task.
///
/// `Pending --(claim)--> Assigned --(result received)--> Completed`.
/// A task whose result never arrives stays `Assigned`; the queue defines no
/// retry edge and relies on the operator re-issuing work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Completed,
}

/// One operator-issued instruction queued for a specific beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    pub agent_id: SessionId,

    /// Opaque command verb; the coordinator never interprets it.
    pub command: String,

    /// Opaque argument payload accompanying the command.
    pub arguments: String,

    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,

    /// Set when the task is claimed for delivery.
    pub assigned_at: Option<DateTime<Utc>>,
}

/// A task as submitted by the operator surface, before storage assigns an id.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub agent_id: SessionId,
    pub command: String,
    pub arguments: String,
    pub created_at: DateTime<Utc>,
}

/// Result payload reported by a beacon for one task. At most one per task;
/// duplicates are discarded keep-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: TaskId,
    pub output: String,
    pub received_at: DateTime<Utc>,
}
