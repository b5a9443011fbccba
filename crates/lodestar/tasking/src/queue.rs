//! Queue operations over the task store.

use crate::error::{TaskingError, TaskingResult};
use chrono::Utc;
use lodestar_storage::{AgentStore, QueryWindow, TaskStore};
use lodestar_types::{AgentStatus, NewTask, SessionId, Task, TaskId, TaskOutput, TaskStatus};
use std::sync::Arc;

/// Instruction queue service.
pub struct TaskQueue {
    tasks: Arc<dyn TaskStore>,
    agents: Arc<dyn AgentStore>,
}

impl TaskQueue {
    pub fn new(tasks: Arc<dyn TaskStore>, agents: Arc<dyn AgentStore>) -> Self {
        Self { tasks, agents }
    }

    /// Queue an instruction for a beacon. Refused unless an active record
    /// exists for the identity.
    pub async fn enqueue(
        &self,
        agent_id: SessionId,
        command: String,
        arguments: String,
    ) -> TaskingResult<Task> {
        let active = self
            .agents
            .get_agent(&agent_id)
            .await?
            .map(|record| record.status == AgentStatus::Active)
            .unwrap_or(false);
        if !active {
            return Err(TaskingError::UnknownAgent(agent_id.short()));
        }

        let task = self
            .tasks
            .insert_task(NewTask {
                agent_id,
                command,
                arguments,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(beacon = %agent_id.short(), task = %task.id, command = %task.command, "task queued");
        Ok(task)
    }

    /// Claim the next pending task for a beacon, oldest first. The claim is
    /// atomic in the store, so no task is ever handed out twice.
    pub async fn next_task(&self, agent_id: &SessionId) -> TaskingResult<Option<Task>> {
        let claimed = self.tasks.claim_next_pending(agent_id, Utc::now()).await?;
        if let Some(task) = &claimed {
            tracing::info!(beacon = %agent_id.short(), task = %task.id, command = %task.command, "task assigned");
        }
        Ok(claimed)
    }

    /// Record the result a beacon reported for a task.
    ///
    /// An unknown id is a protocol desynchronization: logged and surfaced,
    /// nothing written. A result for a task that is no longer assigned is a
    /// retransmission: logged and accepted, keep-first, never an error.
    pub async fn record_result(&self, task_id: TaskId, output: String) -> TaskingResult<()> {
        let task = match self.tasks.get_task(task_id).await? {
            Some(task) => task,
            None => {
                tracing::error!(task = %task_id, "result received for a task that was never issued");
                return Err(TaskingError::UnknownTask(task_id));
            }
        };

        if task.status != TaskStatus::Assigned {
            tracing::warn!(task = %task_id, status = ?task.status, "result received for a task not awaiting one");
        } else if !self.tasks.complete_task(task_id).await? {
            // Lost a race with another completion; fall through to the
            // keep-first output write.
            tracing::warn!(task = %task_id, "task was completed concurrently");
        }

        let written = self
            .tasks
            .insert_output(TaskOutput {
                task_id,
                output,
                received_at: Utc::now(),
            })
            .await?;

        if written {
            tracing::info!(beacon = %task.agent_id.short(), task = %task_id, "task result recorded");
        } else {
            tracing::warn!(task = %task_id, "duplicate result discarded, keeping first");
        }
        Ok(())
    }

    /// One task with its recorded output, if any.
    pub async fn task_with_output(
        &self,
        task_id: TaskId,
    ) -> TaskingResult<Option<(Task, Option<TaskOutput>)>> {
        let Some(task) = self.tasks.get_task(task_id).await? else {
            return Ok(None);
        };
        let output = self.tasks.get_output(task_id).await?;
        Ok(Some((task, output)))
    }

    /// A beacon's task history in issue order, outputs attached.
    pub async fn history(
        &self,
        agent_id: &SessionId,
        window: QueryWindow,
    ) -> TaskingResult<Vec<(Task, Option<TaskOutput>)>> {
        let tasks = self.tasks.list_tasks(agent_id, window).await?;
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            let output = self.tasks.get_output(task.id).await?;
            out.push((task, output));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lodestar_storage::InMemoryStorage;
    use lodestar_types::{AgentRecord, BeaconFingerprint};

    async fn queue_with_active_beacon(id: SessionId) -> (TaskQueue, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        storage
            .upsert_agent(AgentRecord {
                id,
                remote_addr: "203.0.113.7:4444".to_string(),
                fingerprint: BeaconFingerprint::default(),
                status: AgentStatus::Active,
                first_seen: now,
                last_checkin: now,
            })
            .await
            .unwrap();
        (TaskQueue::new(storage.clone(), storage.clone()), storage)
    }

    #[tokio::test]
    async fn enqueue_requires_an_active_beacon() {
        let storage = Arc::new(InMemoryStorage::new());
        let queue = TaskQueue::new(storage.clone(), storage.clone());
        let ghost = SessionId::from_bytes([9; 32]);

        let err = queue
            .enqueue(ghost, "whoami".to_string(), String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskingError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn enqueue_refuses_a_stale_beacon() {
        let id = SessionId::from_bytes([1; 32]);
        let (queue, storage) = queue_with_active_beacon(id).await;
        storage
            .mark_stale(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();

        let err = queue
            .enqueue(id, "whoami".to_string(), String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskingError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn delivery_is_fifo_and_never_repeats() {
        let id = SessionId::from_bytes([1; 32]);
        let (queue, _storage) = queue_with_active_beacon(id).await;

        for command in ["whoami", "hostname", "env"] {
            queue
                .enqueue(id, command.to_string(), String::new())
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        while let Some(task) = queue.next_task(&id).await.unwrap() {
            seen.push(task);
        }

        let ids: Vec<_> = seen.iter().map(|t| t.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted, "claims must be unique and in creation order");
        assert_eq!(
            seen.iter().map(|t| t.command.as_str()).collect::<Vec<_>>(),
            vec!["whoami", "hostname", "env"]
        );
    }

    #[tokio::test]
    async fn result_completes_the_task() {
        let id = SessionId::from_bytes([1; 32]);
        let (queue, storage) = queue_with_active_beacon(id).await;

        let task = queue
            .enqueue(id, "whoami".to_string(), String::new())
            .await
            .unwrap();
        queue.next_task(&id).await.unwrap().unwrap();

        queue.record_result(task.id, "root".to_string()).await.unwrap();

        let stored = storage.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        let output = storage.get_output(task.id).await.unwrap().unwrap();
        assert_eq!(output.output, "root");
    }

    #[tokio::test]
    async fn duplicate_result_keeps_the_first() {
        let id = SessionId::from_bytes([1; 32]);
        let (queue, storage) = queue_with_active_beacon(id).await;

        let task = queue
            .enqueue(id, "whoami".to_string(), String::new())
            .await
            .unwrap();
        queue.next_task(&id).await.unwrap().unwrap();

        queue.record_result(task.id, "root".to_string()).await.unwrap();
        // Retransmission: accepted, not an error, first result wins.
        queue
            .record_result(task.id, "admin".to_string())
            .await
            .unwrap();

        let output = storage.get_output(task.id).await.unwrap().unwrap();
        assert_eq!(output.output, "root");
    }

    #[tokio::test]
    async fn result_for_unknown_task_is_surfaced() {
        let id = SessionId::from_bytes([1; 32]);
        let (queue, storage) = queue_with_active_beacon(id).await;

        let err = queue
            .record_result(TaskId(404), "oops".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskingError::UnknownTask(TaskId(404))));
        assert!(storage.get_output(TaskId(404)).await.unwrap().is_none());
    }
}
