//! The `Task` type and its lifecycle states (spec §3 "Task").

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Attempt;
use crate::util::TaskId;

/// Default task priority (lower numbers dispatch first).
pub const DEFAULT_PRIORITY: i32 = 10;

/// Default per-task timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Where a task sits in its lifecycle.
///
/// Invariants (spec §3): a task in `Dequeued` is assigned to exactly one
/// worker; a task in `Queued` is in the queue's heap; a task in
/// `RetryPending` is in neither the heap nor assigned to a worker, and will
/// be re-enqueued after its backoff; a terminal task (`Completed`/`Failed`)
/// is in neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    RetryPending,
    Dequeued,
    Completed,
    Failed,
}

/// A unit of work submitted to the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: Value,
    pub priority: i32,
    #[serde(with = "crate::util::duration_ms")]
    pub timeout: Duration,
    pub enqueued_at: DateTime<Utc>,
    pub dequeued_at: Option<DateTime<Utc>>,
    pub retries: u32,
    pub max_retries: u32,
    pub status: TaskStatus,
    pub attempts: Vec<Attempt>,
}

impl Task {
    /// Construct a new task in the `Queued` state with an assigned id.
    pub fn new(task_type: String, payload: Value, priority: i32, timeout: Duration) -> Self {
        Self {
            id: TaskId::new(),
            task_type,
            payload,
            priority,
            timeout,
            enqueued_at: Utc::now(),
            dequeued_at: None,
            retries: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            status: TaskStatus::Queued,
            attempts: Vec::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether this task has exhausted its retry budget for a new failure.
    pub fn retry_budget_exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }

    /// Wall-clock deadline for the current dispatch, if dequeued.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.dequeued_at
            .map(|dequeued_at| dequeued_at + chrono::Duration::from_std(self.timeout).unwrap_or_default())
    }
}
