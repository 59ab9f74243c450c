//! The `Worker` data model and its lifecycle state (spec §3 "Worker").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::{TaskId, WorkerId};

/// Where a worker sits in its lifecycle.
///
/// `Initializing -> Ready <-> Busy`, with `ShuttingDown -> Exited` reachable
/// from any state, and `Error` reachable on a fatal protocol failure or an
/// unhandled worker-side error that did not itself cause an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerState {
    Initializing,
    Ready,
    Busy,
    ShuttingDown,
    Exited,
    Error,
}

/// Supervisor-side bookkeeping record for one worker process.
///
/// This is the read model returned by `WorkerStatus`/`AllWorkers`; the
/// dispatch context is the only writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub pid: u32,
    pub state: WorkerState,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub tasks_executed: u64,
    pub current_task_id: Option<TaskId>,
    pub memory_bytes: u64,
    pub restart_count: u32,
}

impl WorkerInfo {
    pub fn new(id: WorkerId, pid: u32) -> Self {
        Self {
            id,
            pid,
            state: WorkerState::Initializing,
            started_at: Utc::now(),
            last_heartbeat_at: None,
            tasks_executed: 0,
            current_task_id: None,
            memory_bytes: 0,
            restart_count: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == WorkerState::Ready
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn new_worker_starts_initializing_with_no_heartbeat() {
        let info = WorkerInfo::new(WorkerId::new(), 123);
        assert_eq!(info.state, WorkerState::Initializing);
        assert!(!info.is_ready());
        assert!(info.last_heartbeat_at.is_none());
    }

    #[test]
    fn state_serializes_kebab_case() {
        let json = serde_json::to_string(&WorkerState::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting-down\"");
    }
}
