//! Pool lifecycle events and the bounded fan-out that delivers them to
//! subscribers (spec §4.6, §9 "event emitter fan-out").
//!
//! Each call to [`EventBus::subscribe`] gets its own bounded `mpsc`
//! receiver. A slow subscriber can only ever fall behind on its own
//! channel — it never applies back-pressure to the dispatch context or to
//! other subscribers. A subscriber whose channel fills simply misses
//! events older than its buffer, logged once as a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::health::Alert;
use crate::util::{TaskId, WorkerId};

/// Default per-subscriber channel capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Something happened in the pool worth telling observers about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PoolEvent {
    PoolInitialized { worker_count: usize, at: DateTime<Utc> },
    TaskSubmitted { task_id: TaskId, at: DateTime<Utc> },
    TaskDispatched { task_id: TaskId, worker_id: WorkerId, at: DateTime<Utc> },
    TaskCompleted { task_id: TaskId, at: DateTime<Utc> },
    TaskFailed { task_id: TaskId, retry_scheduled: bool, at: DateTime<Utc> },
    TaskDeadLettered { task_id: TaskId, at: DateTime<Utc> },
    TaskCancelled { task_id: TaskId, at: DateTime<Utc> },
    WorkerStarted { worker_id: WorkerId, at: DateTime<Utc> },
    WorkerRestarted { worker_id: WorkerId, reason: String, at: DateTime<Utc> },
    WorkerExited { worker_id: WorkerId, at: DateTime<Utc> },
    HealthAlert { alert: Alert, at: DateTime<Utc> },
    PoolScaled { workers: usize, at: DateTime<Utc> },
    PoolShutDown { at: DateTime<Utc> },
    /// Escape hatch for forwarding a worker's own structured log lines to
    /// subscribers without growing this enum for every new worker concern.
    WorkerLog { worker_id: WorkerId, message: Value, at: DateTime<Utc> },
}

/// Publish side, owned by the dispatch context: the only writer.
#[derive(Clone)]
pub struct EventBus {
    subscriber_capacity: usize,
    subscribers: std::sync::Arc<parking_lot::Mutex<Vec<mpsc::Sender<PoolEvent>>>>,
}

impl EventBus {
    pub fn new(subscriber_capacity: usize) -> Self {
        Self {
            subscriber_capacity,
            subscribers: std::sync::Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    /// Register a new subscriber and return its receiver.
    pub fn subscribe(&self) -> mpsc::Receiver<PoolEvent> {
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, dropping any whose
    /// receiver has gone away and warning on any whose buffer is full.
    pub fn publish(&self, event: PoolEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("event subscriber lagging, dropping event for it");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}
