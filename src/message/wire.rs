//! Wire message shapes for the supervisor <-> worker protocol (spec §3/§6).
//!
//! Every message has a `type` discriminant, realized here with serde's
//! internally-tagged enum representation so the JSON on the wire matches the
//! spec's `{"type": "...", ...}` shape exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::Task;
use crate::util::TaskId;
use crate::worker::WorkerState;

/// Parent (supervisor) -> child (worker) messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ParentMessage {
    /// Dispatch a task for execution.
    ExecuteTask { task: Task },
    /// Request an out-of-band liveness check (worker replies with a heartbeat).
    HealthCheck,
    /// Begin shutdown. If `graceful`, the worker finishes its current task
    /// (bounded by the worker's own grace period) before exiting.
    Shutdown { graceful: bool },
}

/// Child (worker) -> parent (supervisor) messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChildMessage {
    /// Sent once at startup after entering the `ready` state.
    WorkerReady,
    /// Periodic liveness + metrics report.
    Heartbeat {
        state: WorkerState,
        tasks_executed: u64,
        memory_bytes: u64,
        cpu_user_ms: u64,
        cpu_sys_ms: u64,
        current_task_id: Option<TaskId>,
    },
    /// A dispatched task finished successfully.
    TaskComplete {
        task_id: TaskId,
        result: Value,
        duration_ms: u64,
    },
    /// A dispatched task finished with an error.
    TaskFailed {
        task_id: TaskId,
        error: ErrorInfo,
        duration_ms: u64,
    },
    /// Post-task memory exceeded the configured threshold. Informational
    /// only — the spec is explicit that this never forces a restart by
    /// itself.
    HighMemoryWarning { bytes: u64 },
    /// Worker encountered an error outside normal task handling.
    WorkerError { error: String, fatal: bool },
    /// Emitted immediately before exit, for any shutdown reason.
    WorkerShutdown { tasks_executed: u64 },
    /// Structured log line forwarded from the worker.
    WorkerLog {
        level: WorkerLogLevel,
        message: String,
    },
}

/// Severity of a forwarded worker log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured error payload carried by `task-failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub kind: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn execute_task_round_trips_through_json() {
        let task = Task::new("echo".into(), Value::Null, 10, std::time::Duration::from_secs(5));
        let msg = ParentMessage::ExecuteTask { task };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"execute-task\""));
        let back: ParentMessage = serde_json::from_str(&json).unwrap();
        match back {
            ParentMessage::ExecuteTask { .. } => {}
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn shutdown_message_carries_graceful_flag() {
        let msg = ParentMessage::Shutdown { graceful: true };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["graceful"], true);
    }

    #[test]
    fn heartbeat_uses_kebab_case_tag() {
        let msg = ChildMessage::Heartbeat {
            state: WorkerState::Ready,
            tasks_executed: 3,
            memory_bytes: 1024,
            cpu_user_ms: 5,
            cpu_sys_ms: 1,
            current_task_id: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "heartbeat");
    }
}
