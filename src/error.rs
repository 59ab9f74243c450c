//! Crate-wide error taxonomy.
//!
//! Two error types carry the distinction the spec draws between recoverable
//! and structural failures (§7 of the spec):
//!
//! - [`TaskErrorKind`] / [`TaskError`] — the terminal outcome of a task that
//!   exhausted its retry budget, returned from a `Submit` future.
//! - [`PoolError`] — structural failures that surface immediately:
//!   back-pressure rejection, cancellation, and post-shutdown submission.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::TaskId;

/// Taxonomy of reasons a single task attempt can fail.
///
/// These are the "kinds, not types" enumerated in the spec's error handling
/// design: every attempt recorded in [`crate::task::Attempt`] carries one of
/// these, and the kind determines whether the attempt counts against the
/// retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskErrorKind {
    /// Worker had no handler registered for the task's `type`.
    NoHandler,
    /// The registered handler returned an error.
    HandlerError,
    /// Wall-clock exceeded the task's timeout.
    TaskTimeout,
    /// The worker process exited (or was observed dead) while executing the task.
    WorkerCrashed,
    /// Malformed frame or JSON on a worker's channel; fatal for that worker.
    ProtocolError,
    /// The caller's cancellation token fired before the task was dispatched.
    Cancelled,
}

impl TaskErrorKind {
    /// Every kind above counts as one attempt against the retry budget —
    /// the spec draws no distinction in retry accounting between a
    /// handler error, a timeout, or a crash.
    pub fn counts_as_attempt(self) -> bool {
        true
    }
}

impl TaskErrorKind {
    /// Parse the wire representation used in `ErrorInfo::kind`. Unknown
    /// strings (e.g. from a future worker version) fall back to
    /// `HandlerError` so they still count toward the retry budget instead
    /// of being silently dropped.
    pub fn from_wire_str(s: &str) -> Self {
        match s {
            "no-handler" => Self::NoHandler,
            "task-timeout" => Self::TaskTimeout,
            "worker-crashed" => Self::WorkerCrashed,
            "protocol-error" => Self::ProtocolError,
            "cancelled" => Self::Cancelled,
            _ => Self::HandlerError,
        }
    }
}

impl std::fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoHandler => "no-handler",
            Self::HandlerError => "handler-error",
            Self::TaskTimeout => "task-timeout",
            Self::WorkerCrashed => "worker-crashed",
            Self::ProtocolError => "protocol-error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A single recorded failure, as appended to a task's `attempts` history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub timestamp: DateTime<Utc>,
    pub kind: TaskErrorKind,
    pub message: String,
}

/// The terminal error a `Submit` future resolves with once a task's retry
/// budget is exhausted and it has been moved to the dead-letter queue.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("task {task_id} failed after {attempts} attempts: {last_kind} ({last_message})")]
pub struct TaskError {
    pub task_id: TaskId,
    pub attempts: u32,
    pub last_kind: TaskErrorKind,
    pub last_message: String,
    pub history: Vec<Attempt>,
}

/// Structural errors that surface immediately rather than going through the
/// retry/DLQ pipeline.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `Submit` was rejected because `max_queue_depth` was exceeded and the
    /// pool is configured with `submit_on_overflow = reject`.
    #[error("queue is full (depth >= {max_queue_depth})")]
    QueueFull { max_queue_depth: usize },

    /// The caller's cancellation token fired before the task was dequeued.
    #[error("task {task_id} was cancelled before dispatch")]
    Cancelled { task_id: TaskId },

    /// Submission arrived after `Shutdown` had already been called.
    #[error("pool is shut down, submission rejected")]
    ShutDown,

    /// The requested task was not found (e.g. querying status after the
    /// completion grace window).
    #[error("task {task_id} is unknown or has been evicted")]
    UnknownTask { task_id: TaskId },

    /// `Initialize` or a scaling operation could not bring the pool to the
    /// requested size within its start timeout.
    #[error("failed to start worker: {reason}")]
    WorkerStartFailed { reason: String },

    /// A scale request fell outside `[min_workers, max_workers]`.
    #[error("scale request out of bounds: requested {requested}, bounds [{min}, {max}]")]
    ScaleOutOfBounds {
        requested: usize,
        min: usize,
        max: usize,
    },

    /// `Shutdown(graceful = true)` did not finish draining in-flight tasks
    /// within its grace period.
    #[error("graceful shutdown did not complete within {grace:?}")]
    ShutdownTimedOut { grace: Duration },

    /// Invalid configuration supplied to `PoolConfig::builder().build()`.
    #[error("invalid pool configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn task_error_kind_display_matches_spec_wire_names() {
        assert_eq!(TaskErrorKind::NoHandler.to_string(), "no-handler");
        assert_eq!(TaskErrorKind::WorkerCrashed.to_string(), "worker-crashed");
    }

    #[test]
    fn queue_full_message_includes_limit() {
        let err = PoolError::QueueFull {
            max_queue_depth: 100,
        };
        assert!(err.to_string().contains("100"));
    }
}
