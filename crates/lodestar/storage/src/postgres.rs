//! PostgreSQL adapter for Lodestar storage.
//!
//! This adapter is the transactional source-of-truth backend. Racy state
//! transitions (task claims, stale sweeps) are single conditional statements
//! so correctness does not depend on application-level locking.

use crate::traits::{AgentStore, QueryWindow, TaskStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_types::{
    AgentRecord, AgentStatus, BeaconFingerprint, NewTask, SessionId, Task, TaskId, TaskOutput,
    TaskStatus,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

/// PostgreSQL-backed coordinator storage adapter.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS beacons (
                id TEXT PRIMARY KEY,
                remote_addr TEXT NOT NULL,
                fingerprint JSONB NOT NULL,
                status TEXT NOT NULL,
                first_seen TIMESTAMPTZ NOT NULL,
                last_checkin TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id BIGSERIAL PRIMARY KEY,
                beacon_id TEXT NOT NULL REFERENCES beacons(id),
                command TEXT NOT NULL,
                arguments TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                assigned_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS task_outputs (
                task_id BIGINT PRIMARY KEY REFERENCES tasks(task_id),
                output TEXT NOT NULL,
                received_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_tasks_claim
                ON tasks (beacon_id, status, created_at, task_id)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_beacons_checkin
                ON beacons (status, last_checkin)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AgentStore for PostgresStorage {
    async fn upsert_agent(&self, record: AgentRecord) -> StorageResult<AgentRecord> {
        let fingerprint = serde_json::to_value(&record.fingerprint)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO beacons (id, remote_addr, fingerprint, status, first_seen, last_checkin)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                remote_addr = EXCLUDED.remote_addr,
                status = EXCLUDED.status,
                last_checkin = EXCLUDED.last_checkin
            RETURNING id, remote_addr, fingerprint, status, first_seen, last_checkin
            "#,
        )
        .bind(record.id.to_hex())
        .bind(record.remote_addr)
        .bind(fingerprint)
        .bind(agent_status_to_str(AgentStatus::Active))
        .bind(record.first_seen)
        .bind(record.last_checkin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        agent_row_to_record(row)
    }

    async fn get_agent(&self, id: &SessionId) -> StorageResult<Option<AgentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, remote_addr, fingerprint, status, first_seen, last_checkin
              FROM beacons
             WHERE id = $1
            "#,
        )
        .bind(id.to_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(agent_row_to_record).transpose()
    }

    async fn touch_agent(&self, id: &SessionId, now: DateTime<Utc>) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE beacons
               SET last_checkin = $1,
                   status = $2
             WHERE id = $3
            "#,
        )
        .bind(now)
        .bind(agent_status_to_str(AgentStatus::Active))
        .bind(id.to_hex())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_agents(&self, window: QueryWindow) -> StorageResult<Vec<AgentRecord>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT id, remote_addr, fingerprint, status, first_seen, last_checkin
                  FROM beacons
                 ORDER BY last_checkin DESC
                 OFFSET $1
                "#,
            )
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT id, remote_addr, fingerprint, status, first_seen, last_checkin
                  FROM beacons
                 ORDER BY last_checkin DESC
                 LIMIT $1 OFFSET $2
                "#,
            )
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(agent_row_to_record).collect()
    }

    async fn mark_stale(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE beacons
               SET status = $1
             WHERE status = $2
               AND last_checkin < $3
            "#,
        )
        .bind(agent_status_to_str(AgentStatus::Stale))
        .bind(agent_status_to_str(AgentStatus::Active))
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TaskStore for PostgresStorage {
    async fn insert_task(&self, task: NewTask) -> StorageResult<Task> {
        let row = sqlx::query(
            r#"
            INSERT INTO tasks (beacon_id, command, arguments, status, created_at, assigned_at)
            VALUES ($1, $2, $3, $4, $5, NULL)
            RETURNING task_id, beacon_id, command, arguments, status, created_at, assigned_at
            "#,
        )
        .bind(task.agent_id.to_hex())
        .bind(task.command)
        .bind(task.arguments)
        .bind(task_status_to_str(TaskStatus::Pending))
        .bind(task.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        task_row_to_record(row)
    }

    async fn get_task(&self, id: TaskId) -> StorageResult<Option<Task>> {
        let row = sqlx::query(
            r#"
            SELECT task_id, beacon_id, command, arguments, status, created_at, assigned_at
              FROM tasks
             WHERE task_id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(task_row_to_record).transpose()
    }

    async fn claim_next_pending(
        &self,
        agent_id: &SessionId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        // One statement selects and transitions; SKIP LOCKED keeps two
        // concurrent claimants from ever both succeeding on one row.
        let row = sqlx::query(
            r#"
            UPDATE tasks
               SET status = $1,
                   assigned_at = $2
             WHERE task_id = (
                    SELECT task_id
                      FROM tasks
                     WHERE beacon_id = $3
                       AND status = $4
                     ORDER BY created_at, task_id
                     LIMIT 1
                       FOR UPDATE SKIP LOCKED
                   )
            RETURNING task_id, beacon_id, command, arguments, status, created_at, assigned_at
            "#,
        )
        .bind(task_status_to_str(TaskStatus::Assigned))
        .bind(now)
        .bind(agent_id.to_hex())
        .bind(task_status_to_str(TaskStatus::Pending))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(task_row_to_record).transpose()
    }

    async fn complete_task(&self, id: TaskId) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
               SET status = $1
             WHERE task_id = $2
               AND status = $3
            "#,
        )
        .bind(task_status_to_str(TaskStatus::Completed))
        .bind(id.as_i64())
        .bind(task_status_to_str(TaskStatus::Assigned))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_output(&self, output: TaskOutput) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO task_outputs (task_id, output, received_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (task_id) DO NOTHING
            "#,
        )
        .bind(output.task_id.as_i64())
        .bind(output.output)
        .bind(output.received_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_output(&self, id: TaskId) -> StorageResult<Option<TaskOutput>> {
        let row = sqlx::query(
            r#"
            SELECT task_id, output, received_at
              FROM task_outputs
             WHERE task_id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(output_row_to_record).transpose()
    }

    async fn list_tasks(
        &self,
        agent_id: &SessionId,
        window: QueryWindow,
    ) -> StorageResult<Vec<Task>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT task_id, beacon_id, command, arguments, status, created_at, assigned_at
                  FROM tasks
                 WHERE beacon_id = $1
                 ORDER BY task_id
                 OFFSET $2
                "#,
            )
            .bind(agent_id.to_hex())
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT task_id, beacon_id, command, arguments, status, created_at, assigned_at
                  FROM tasks
                 WHERE beacon_id = $1
                 ORDER BY task_id
                 LIMIT $2 OFFSET $3
                "#,
            )
            .bind(agent_id.to_hex())
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(task_row_to_record).collect()
    }
}

fn agent_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<AgentRecord> {
    let id_raw: String = row
        .try_get("id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let id = SessionId::from_hex(&id_raw)
        .map_err(|e| StorageError::Serialization(format!("bad stored identity: {e}")))?;

    let fingerprint_json: serde_json::Value = row
        .try_get("fingerprint")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let fingerprint: BeaconFingerprint = serde_json::from_value(fingerprint_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let status_raw: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(AgentRecord {
        id,
        remote_addr: row
            .try_get("remote_addr")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        fingerprint,
        status: parse_agent_status(&status_raw)?,
        first_seen: row
            .try_get("first_seen")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        last_checkin: row
            .try_get("last_checkin")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn task_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<Task> {
    let agent_raw: String = row
        .try_get("beacon_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let agent_id = SessionId::from_hex(&agent_raw)
        .map_err(|e| StorageError::Serialization(format!("bad stored identity: {e}")))?;

    let status_raw: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Task {
        id: TaskId(
            row.try_get::<i64, _>("task_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        agent_id,
        command: row
            .try_get("command")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        arguments: row
            .try_get("arguments")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        status: parse_task_status(&status_raw)?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        assigned_at: row
            .try_get("assigned_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn output_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<TaskOutput> {
    Ok(TaskOutput {
        task_id: TaskId(
            row.try_get::<i64, _>("task_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        output: row
            .try_get("output")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        received_at: row
            .try_get("received_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn agent_status_to_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Active => "active",
        AgentStatus::Stale => "stale",
    }
}

fn parse_agent_status(raw: &str) -> StorageResult<AgentStatus> {
    match raw {
        "active" => Ok(AgentStatus::Active),
        "stale" => Ok(AgentStatus::Stale),
        _ => Err(StorageError::Serialization(format!(
            "unknown agent status `{raw}`"
        ))),
    }
}

fn task_status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Assigned => "assigned",
        TaskStatus::Completed => "completed",
    }
}

fn parse_task_status(raw: &str) -> StorageResult<TaskStatus> {
    match raw {
        "pending" => Ok(TaskStatus::Pending),
        "assigned" => Ok(TaskStatus::Assigned),
        "completed" => Ok(TaskStatus::Completed),
        _ => Err(StorageError::Serialization(format!(
            "unknown task status `{raw}`"
        ))),
    }
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}
