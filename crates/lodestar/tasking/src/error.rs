use lodestar_storage::StorageError;
use lodestar_types::TaskId;
use thiserror::Error;

/// Result type for queue operations.
pub type TaskingResult<T> = Result<T, TaskingError>;

/// Instruction queue errors.
#[derive(Debug, Error)]
pub enum TaskingError {
    /// Instruction targeted an identity with no active beacon record.
    /// Surfaced to the operator, never to a beacon.
    #[error("no active beacon for identity {0}")]
    UnknownAgent(String),

    /// A result arrived for a task id that was never issued; the beacon and
    /// coordinator have desynchronized.
    #[error("no task with id {0}")]
    UnknownTask(TaskId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
