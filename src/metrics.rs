//! A point-in-time snapshot of pool state, returned by the public
//! `PoolMetrics` operation (spec §6).

use serde::{Deserialize, Serialize};

use crate::task::QueueStats;

/// Aggregate pool metrics, cheap enough to poll frequently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub total_workers: usize,
    pub ready_workers: usize,
    pub busy_workers: usize,
    pub queue_depth: usize,
    pub retry_pending: usize,
    pub dead_lettered: usize,
    pub oldest_task_age_ms: Option<u64>,
    pub avg_wait_ms: Option<f64>,
    pub avg_duration_ms: Option<f64>,
    pub total_restarts: u64,
    /// Lifetime worker processes spawned (initial pool, scale-ups, and
    /// restarts combined).
    pub workers_spawned: u64,
    /// Lifetime tasks that reached `task-complete`.
    pub completed_tasks: u64,
    /// `completed_tasks / workers_spawned`; target ≥ 0.95 per the glossary.
    /// `0.0` when no worker has been spawned yet.
    pub reuse_rate: f64,
}

impl PoolMetrics {
    pub fn from_queue_stats(
        queue_stats: &QueueStats,
        total_workers: usize,
        ready_workers: usize,
        busy_workers: usize,
        total_restarts: u64,
        workers_spawned: u64,
        completed_tasks: u64,
    ) -> Self {
        let reuse_rate = if workers_spawned == 0 {
            0.0
        } else {
            completed_tasks as f64 / workers_spawned as f64
        };
        Self {
            total_workers,
            ready_workers,
            busy_workers,
            queue_depth: queue_stats.depth,
            retry_pending: queue_stats.retry_pending,
            dead_lettered: queue_stats.dead_lettered,
            oldest_task_age_ms: queue_stats.oldest_task_age.map(|d| d.as_millis() as u64),
            avg_wait_ms: queue_stats.avg_wait_ms,
            avg_duration_ms: queue_stats.avg_duration_ms,
            total_restarts,
            workers_spawned,
            completed_tasks,
            reuse_rate,
        }
    }
}
