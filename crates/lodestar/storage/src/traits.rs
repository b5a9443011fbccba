use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_types::{AgentRecord, NewTask, SessionId, Task, TaskId, TaskOutput};

/// Generic query window for paged reads. A zero limit means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Storage interface for beacon session records.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Insert a record, or refresh an existing one in place.
    ///
    /// On refresh only `remote_addr`, `last_checkin` and `status` change;
    /// `first_seen` and the registration-time fingerprint are preserved.
    /// Idempotent: repeated identical calls produce one record.
    async fn upsert_agent(&self, record: AgentRecord) -> StorageResult<AgentRecord>;

    /// Get one record by session identity.
    async fn get_agent(&self, id: &SessionId) -> StorageResult<Option<AgentRecord>>;

    /// Refresh `last_checkin` and re-activate. Returns false when no record
    /// exists for the identity.
    async fn touch_agent(&self, id: &SessionId, now: DateTime<Utc>) -> StorageResult<bool>;

    /// List records, most recent check-in first.
    async fn list_agents(&self, window: QueryWindow) -> StorageResult<Vec<AgentRecord>>;

    /// Mark every active record whose last check-in predates `cutoff` as
    /// stale. Returns the number of transitions; a second identical sweep
    /// returns zero.
    async fn mark_stale(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}

/// Storage interface for the per-beacon instruction queue.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Append a pending task; the store assigns the next numeric id.
    async fn insert_task(&self, task: NewTask) -> StorageResult<Task>;

    /// Get one task by id.
    async fn get_task(&self, id: TaskId) -> StorageResult<Option<Task>>;

    /// Claim the oldest pending task for a beacon, transitioning it to
    /// assigned. The claim is atomic: under concurrent callers at most one
    /// receives any given task. Ordering is creation time, ties broken by
    /// ascending id.
    async fn claim_next_pending(
        &self,
        agent_id: &SessionId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>>;

    /// Conditionally transition `Assigned -> Completed`. Returns false when
    /// the task is missing or not currently assigned.
    async fn complete_task(&self, id: TaskId) -> StorageResult<bool>;

    /// Record a task output, keep-first: returns false (and writes nothing)
    /// when an output row already exists for the task.
    async fn insert_output(&self, output: TaskOutput) -> StorageResult<bool>;

    /// Get the output recorded for a task, if any.
    async fn get_output(&self, id: TaskId) -> StorageResult<Option<TaskOutput>>;

    /// List a beacon's tasks in ascending id order.
    async fn list_tasks(
        &self,
        agent_id: &SessionId,
        window: QueryWindow,
    ) -> StorageResult<Vec<Task>>;
}

/// Unified storage bundle used by the coordinator surfaces.
pub trait CoordinatorStorage: AgentStore + TaskStore + Send + Sync {}

impl<T> CoordinatorStorage for T where T: AgentStore + TaskStore + Send + Sync {}
