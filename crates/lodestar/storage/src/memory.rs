//! In-memory reference implementation for Lodestar storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use a transactional backend (PostgreSQL) for source-of-truth data.

use crate::traits::{AgentStore, QueryWindow, TaskStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_types::{
    AgentRecord, AgentStatus, NewTask, SessionId, Task, TaskId, TaskOutput, TaskStatus,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory coordinator storage adapter.
#[derive(Default)]
pub struct InMemoryStorage {
    agents: RwLock<HashMap<SessionId, AgentRecord>>,
    // BTreeMap keeps tasks in id order, which is also claim order.
    tasks: RwLock<BTreeMap<i64, Task>>,
    outputs: RwLock<HashMap<i64, TaskOutput>>,
    next_task_id: RwLock<i64>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for InMemoryStorage {
    async fn upsert_agent(&self, record: AgentRecord) -> StorageResult<AgentRecord> {
        let mut guard = self
            .agents
            .write()
            .map_err(|_| StorageError::Backend("agents lock poisoned".to_string()))?;

        let stored = match guard.get_mut(&record.id) {
            Some(existing) => {
                existing.remote_addr = record.remote_addr;
                existing.last_checkin = record.last_checkin;
                existing.status = AgentStatus::Active;
                existing.clone()
            }
            None => {
                guard.insert(record.id, record.clone());
                record
            }
        };
        Ok(stored)
    }

    async fn get_agent(&self, id: &SessionId) -> StorageResult<Option<AgentRecord>> {
        let guard = self
            .agents
            .read()
            .map_err(|_| StorageError::Backend("agents lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn touch_agent(&self, id: &SessionId, now: DateTime<Utc>) -> StorageResult<bool> {
        let mut guard = self
            .agents
            .write()
            .map_err(|_| StorageError::Backend("agents lock poisoned".to_string()))?;
        match guard.get_mut(id) {
            Some(record) => {
                record.last_checkin = now;
                record.status = AgentStatus::Active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_agents(&self, window: QueryWindow) -> StorageResult<Vec<AgentRecord>> {
        let guard = self
            .agents
            .read()
            .map_err(|_| StorageError::Backend("agents lock poisoned".to_string()))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.last_checkin.cmp(&a.last_checkin));
        Ok(apply_window(values, window))
    }

    async fn mark_stale(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut guard = self
            .agents
            .write()
            .map_err(|_| StorageError::Backend("agents lock poisoned".to_string()))?;
        let mut count = 0;
        for record in guard.values_mut() {
            if record.status == AgentStatus::Active && record.last_checkin < cutoff {
                record.status = AgentStatus::Stale;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl TaskStore for InMemoryStorage {
    async fn insert_task(&self, task: NewTask) -> StorageResult<Task> {
        let mut id_guard = self
            .next_task_id
            .write()
            .map_err(|_| StorageError::Backend("task id lock poisoned".to_string()))?;
        let mut guard = self
            .tasks
            .write()
            .map_err(|_| StorageError::Backend("tasks lock poisoned".to_string()))?;

        *id_guard += 1;
        let stored = Task {
            id: TaskId(*id_guard),
            agent_id: task.agent_id,
            command: task.command,
            arguments: task.arguments,
            status: TaskStatus::Pending,
            created_at: task.created_at,
            assigned_at: None,
        };
        guard.insert(stored.id.as_i64(), stored.clone());
        Ok(stored)
    }

    async fn get_task(&self, id: TaskId) -> StorageResult<Option<Task>> {
        let guard = self
            .tasks
            .read()
            .map_err(|_| StorageError::Backend("tasks lock poisoned".to_string()))?;
        Ok(guard.get(&id.as_i64()).cloned())
    }

    async fn claim_next_pending(
        &self,
        agent_id: &SessionId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        // Single write lock makes select-and-transition one atomic step.
        let mut guard = self
            .tasks
            .write()
            .map_err(|_| StorageError::Backend("tasks lock poisoned".to_string()))?;

        let candidate = guard
            .values()
            .filter(|t| t.agent_id == *agent_id && t.status == TaskStatus::Pending)
            .min_by_key(|t| (t.created_at, t.id))
            .map(|t| t.id.as_i64());

        let Some(key) = candidate else {
            return Ok(None);
        };

        let task = guard
            .get_mut(&key)
            .ok_or_else(|| StorageError::Backend("claimed task vanished".to_string()))?;
        task.status = TaskStatus::Assigned;
        task.assigned_at = Some(now);
        Ok(Some(task.clone()))
    }

    async fn complete_task(&self, id: TaskId) -> StorageResult<bool> {
        let mut guard = self
            .tasks
            .write()
            .map_err(|_| StorageError::Backend("tasks lock poisoned".to_string()))?;
        match guard.get_mut(&id.as_i64()) {
            Some(task) if task.status == TaskStatus::Assigned => {
                task.status = TaskStatus::Completed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_output(&self, output: TaskOutput) -> StorageResult<bool> {
        let mut guard = self
            .outputs
            .write()
            .map_err(|_| StorageError::Backend("outputs lock poisoned".to_string()))?;
        if guard.contains_key(&output.task_id.as_i64()) {
            return Ok(false);
        }
        guard.insert(output.task_id.as_i64(), output);
        Ok(true)
    }

    async fn get_output(&self, id: TaskId) -> StorageResult<Option<TaskOutput>> {
        let guard = self
            .outputs
            .read()
            .map_err(|_| StorageError::Backend("outputs lock poisoned".to_string()))?;
        Ok(guard.get(&id.as_i64()).cloned())
    }

    async fn list_tasks(
        &self,
        agent_id: &SessionId,
        window: QueryWindow,
    ) -> StorageResult<Vec<Task>> {
        let guard = self
            .tasks
            .read()
            .map_err(|_| StorageError::Backend("tasks lock poisoned".to_string()))?;
        let values = guard
            .values()
            .filter(|t| t.agent_id == *agent_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok(apply_window(values, window))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lodestar_types::BeaconFingerprint;

    fn record(id: u8, checkin: DateTime<Utc>) -> AgentRecord {
        AgentRecord {
            id: SessionId::from_bytes([id; 32]),
            remote_addr: "203.0.113.7:4444".to_string(),
            fingerprint: BeaconFingerprint::default(),
            status: AgentStatus::Active,
            first_seen: checkin,
            last_checkin: checkin,
        }
    }

    fn new_task(id: u8, created_at: DateTime<Utc>) -> NewTask {
        NewTask {
            agent_id: SessionId::from_bytes([id; 32]),
            command: "whoami".to_string(),
            arguments: String::new(),
            created_at,
        }
    }

    #[tokio::test]
    async fn upsert_preserves_first_seen() {
        let storage = InMemoryStorage::new();
        let t0 = Utc::now();
        storage.upsert_agent(record(1, t0)).await.unwrap();

        let mut refreshed = record(1, t0 + Duration::seconds(30));
        refreshed.remote_addr = "198.51.100.9:1080".to_string();
        refreshed.first_seen = t0 + Duration::seconds(30);
        let stored = storage.upsert_agent(refreshed).await.unwrap();

        assert_eq!(stored.first_seen, t0);
        assert_eq!(stored.last_checkin, t0 + Duration::seconds(30));
        assert_eq!(stored.remote_addr, "198.51.100.9:1080");

        let all = storage.list_agents(QueryWindow::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn claim_is_fifo_and_single_shot() {
        let storage = InMemoryStorage::new();
        let agent = SessionId::from_bytes([1; 32]);
        let t0 = Utc::now();

        let first = storage.insert_task(new_task(1, t0)).await.unwrap();
        let second = storage
            .insert_task(new_task(1, t0 + Duration::seconds(1)))
            .await
            .unwrap();

        let claimed = storage
            .claim_next_pending(&agent, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, TaskStatus::Assigned);
        assert!(claimed.assigned_at.is_some());

        let claimed = storage
            .claim_next_pending(&agent, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(storage
            .claim_next_pending(&agent, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn creation_time_ties_break_by_ascending_id() {
        let storage = InMemoryStorage::new();
        let agent = SessionId::from_bytes([1; 32]);
        let t0 = Utc::now();

        let a = storage.insert_task(new_task(1, t0)).await.unwrap();
        let b = storage.insert_task(new_task(1, t0)).await.unwrap();
        assert!(a.id < b.id);

        let claimed = storage
            .claim_next_pending(&agent, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, a.id);
    }

    #[tokio::test]
    async fn mark_stale_is_idempotent() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        storage
            .upsert_agent(record(1, now - Duration::seconds(700)))
            .await
            .unwrap();
        storage.upsert_agent(record(2, now)).await.unwrap();

        let cutoff = now - Duration::seconds(600);
        assert_eq!(storage.mark_stale(cutoff).await.unwrap(), 1);
        assert_eq!(storage.mark_stale(cutoff).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn output_is_keep_first() {
        let storage = InMemoryStorage::new();
        let task = storage.insert_task(new_task(1, Utc::now())).await.unwrap();

        let original = TaskOutput {
            task_id: task.id,
            output: "root".to_string(),
            received_at: Utc::now(),
        };
        assert!(storage.insert_output(original.clone()).await.unwrap());

        let duplicate = TaskOutput {
            task_id: task.id,
            output: "retransmission".to_string(),
            received_at: Utc::now(),
        };
        assert!(!storage.insert_output(duplicate).await.unwrap());

        let stored = storage.get_output(task.id).await.unwrap().unwrap();
        assert_eq!(stored.output, "root");
    }

    #[tokio::test]
    async fn complete_requires_assigned() {
        let storage = InMemoryStorage::new();
        let agent = SessionId::from_bytes([1; 32]);
        let task = storage.insert_task(new_task(1, Utc::now())).await.unwrap();

        // Still pending.
        assert!(!storage.complete_task(task.id).await.unwrap());

        storage
            .claim_next_pending(&agent, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(storage.complete_task(task.id).await.unwrap());
        // Already completed.
        assert!(!storage.complete_task(task.id).await.unwrap());
    }

    #[tokio::test]
    async fn touch_on_missing_record_reports_false() {
        let storage = InMemoryStorage::new();
        let ghost = SessionId::from_bytes([9; 32]);
        assert!(!storage.touch_agent(&ghost, Utc::now()).await.unwrap());
    }
}
