//! Health monitor: a periodic, pure-observer scan over worker heartbeat
//! state that decides restarts and raises alerts (spec §4.3).
//!
//! The monitor never touches a worker process directly — it reads the
//! worker registry snapshot the dispatch context hands it and returns a
//! list of [`HealthAction`]s for that context to carry out. This keeps all
//! process manipulation on the single dispatch task while the decision
//! logic stays independently testable.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PoolConfig;
use crate::health::alert::{Alert, AlertKind, AlertLog, AlertSeverity};
use crate::util::WorkerId;
use crate::worker::WorkerInfo;

const DEFAULT_ALERT_LOG_CAPACITY: usize = 256;

/// Window over which recent critical alerts count toward overall status
/// (spec §4.3: "no critical alerts in the last 5 min").
const CRITICAL_ALERT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Pool-wide health rollup, as opposed to per-worker state (spec §4.3
/// `Snapshot() -> HealthReport`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Result of [`HealthMonitor::snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub total_workers: usize,
    pub healthy_workers: usize,
    pub utilization: f64,
    pub recent_critical_alerts: usize,
    pub generated_at: DateTime<Utc>,
}

/// A restart decision the dispatch context must carry out: force-kill the
/// process if still alive, then spawn a replacement with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthAction {
    pub worker_id: WorkerId,
}

#[derive(Debug)]
struct RestartState {
    count: u32,
    last_restart_at: Option<DateTime<Utc>>,
    window_started_at: DateTime<Utc>,
}

impl RestartState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            last_restart_at: None,
            window_started_at: now,
        }
    }
}

/// Thresholds and policy the monitor enforces, lifted from [`PoolConfig`]
/// at construction time so the monitor doesn't need the whole config.
#[derive(Debug, Clone)]
struct HealthPolicy {
    heartbeat_timeout: Duration,
    zombie_threshold: Duration,
    memory_threshold_bytes: u64,
    restart_on_memory: bool,
    auto_restart: bool,
    max_restart_attempts: u32,
    restart_cooldown: Duration,
    restart_counter_reset_after: Duration,
}

impl From<&PoolConfig> for HealthPolicy {
    fn from(config: &PoolConfig) -> Self {
        Self {
            heartbeat_timeout: config.heartbeat_timeout_ms,
            zombie_threshold: config.zombie_threshold_ms,
            memory_threshold_bytes: config.worker_memory_threshold_mb * 1024 * 1024,
            restart_on_memory: config.restart_on_memory,
            auto_restart: config.auto_restart,
            max_restart_attempts: config.max_restart_attempts,
            restart_cooldown: config.restart_cooldown_ms,
            restart_counter_reset_after: config.restart_counter_reset_after_ms,
        }
    }
}

pub struct HealthMonitor {
    policy: HealthPolicy,
    restart_state: HashMap<WorkerId, RestartState>,
    alerts: AlertLog,
}

impl HealthMonitor {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            policy: HealthPolicy::from(config),
            restart_state: HashMap::new(),
            alerts: AlertLog::new(DEFAULT_ALERT_LOG_CAPACITY),
        }
    }

    /// The bounded alert history retained for metrics/introspection.
    pub fn alert_log(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.recent()
    }

    /// Evaluate every worker in `workers` against the configured thresholds.
    /// Returns the workers that should be restarted and any alerts raised
    /// by this call specifically (not the whole retained history) — call
    /// on the health check interval (spec §4.3's periodic scan).
    pub fn scan(&mut self, workers: &[WorkerInfo], now: DateTime<Utc>) -> (Vec<HealthAction>, Vec<Alert>) {
        let mut actions = Vec::new();
        let mut raised = Vec::new();
        for worker in workers {
            if let Some(action) = self.evaluate(worker, now, &mut raised) {
                actions.push(action);
            }
        }
        (actions, raised)
    }

    /// `Snapshot() -> HealthReport` (spec §4.3): a point-in-time rollup of
    /// worker health and pool utilization, independent of `scan`'s
    /// restart side effects — safe to call as often as an introspection
    /// caller likes.
    ///
    /// Status order matches the spec precisely: `healthy` requires both
    /// the 80% threshold and a clean recent-alert window; `degraded`
    /// covers the 50-80% band or over-90% utilization; anything else,
    /// including a worker ratio above 80% with a recent critical alert, is
    /// `critical`.
    pub fn snapshot(&self, workers: &[WorkerInfo], now: DateTime<Utc>) -> HealthReport {
        let total_workers = workers.len();
        let healthy_workers = workers.iter().filter(|w| self.is_healthy(w, now)).count();
        let busy_workers = workers.iter().filter(|w| w.current_task_id.is_some()).count();
        let utilization = if total_workers == 0 { 0.0 } else { busy_workers as f64 / total_workers as f64 };
        let healthy_ratio = if total_workers == 0 { 1.0 } else { healthy_workers as f64 / total_workers as f64 };

        let recent_critical_alerts = self
            .alerts
            .recent()
            .filter(|a| {
                a.severity == AlertSeverity::Critical
                    && (now - a.observed_at).to_std().unwrap_or(Duration::ZERO) <= CRITICAL_ALERT_WINDOW
            })
            .count();

        let status = if healthy_ratio >= 0.8 && recent_critical_alerts == 0 {
            OverallStatus::Healthy
        } else if (0.5..0.8).contains(&healthy_ratio) || utilization > 0.9 {
            OverallStatus::Degraded
        } else {
            OverallStatus::Critical
        };

        HealthReport {
            status,
            total_workers,
            healthy_workers,
            utilization,
            recent_critical_alerts,
            generated_at: now,
        }
    }

    /// A worker is healthy iff it hasn't missed its heartbeat deadline;
    /// matches the condition `evaluate` raises `MissedHeartbeats` on.
    fn is_healthy(&self, worker: &WorkerInfo, now: DateTime<Utc>) -> bool {
        let since_heartbeat = worker.last_heartbeat_at.map(|t| (now - t).to_std().unwrap_or(Duration::ZERO));
        !since_heartbeat.is_some_and(|d| d > self.policy.heartbeat_timeout)
    }

    /// Record that a worker was observed unreachable outside the normal
    /// scan (e.g. its process exited without a `worker-shutdown` message).
    /// Always schedules a restart attempt, subject to the same cooldown and
    /// attempt-budget rules as a heartbeat-driven restart.
    pub fn record_crash(&mut self, worker_id: WorkerId, now: DateTime<Utc>) -> (Option<HealthAction>, Vec<Alert>) {
        let mut raised = Vec::new();
        self.raise(&mut raised, Alert::new(
            worker_id,
            AlertKind::Zombie,
            AlertSeverity::Critical,
            "worker process exited unexpectedly",
        ));
        let action = self.maybe_restart(worker_id, now, &mut raised);
        (action, raised)
    }

    fn raise(&mut self, raised: &mut Vec<Alert>, alert: Alert) {
        self.alerts.push(alert.clone());
        raised.push(alert);
    }

    fn evaluate(&mut self, worker: &WorkerInfo, now: DateTime<Utc>, raised: &mut Vec<Alert>) -> Option<HealthAction> {
        let since_heartbeat = worker
            .last_heartbeat_at
            .map(|t| (now - t).to_std().unwrap_or(Duration::ZERO));

        let is_zombie = since_heartbeat.is_some_and(|d| d > self.policy.zombie_threshold);
        let missed_heartbeat = since_heartbeat.is_some_and(|d| d > self.policy.heartbeat_timeout);
        let high_memory = worker.memory_bytes > self.policy.memory_threshold_bytes;

        if is_zombie {
            warn!(worker_id = %worker.id, "worker exceeded zombie threshold with no heartbeat");
            self.raise(raised, Alert::new(
                worker.id,
                AlertKind::Zombie,
                AlertSeverity::Critical,
                "no heartbeat within the zombie threshold",
            ));
            return self.maybe_restart(worker.id, now, raised);
        }

        if missed_heartbeat {
            warn!(worker_id = %worker.id, "worker missed its heartbeat deadline");
            self.raise(raised, Alert::new(
                worker.id,
                AlertKind::MissedHeartbeats,
                AlertSeverity::Warning,
                "no heartbeat within the configured timeout",
            ));
            return self.maybe_restart(worker.id, now, raised);
        }

        if high_memory {
            self.raise(raised, Alert::new(
                worker.id,
                AlertKind::HighMemory,
                AlertSeverity::Warning,
                format!("memory usage {} bytes exceeds threshold", worker.memory_bytes),
            ));
            if self.policy.restart_on_memory {
                return self.maybe_restart(worker.id, now, raised);
            }
        }

        None
    }

    fn maybe_restart(&mut self, worker_id: WorkerId, now: DateTime<Utc>, raised: &mut Vec<Alert>) -> Option<HealthAction> {
        if !self.policy.auto_restart {
            return None;
        }

        let state = self
            .restart_state
            .entry(worker_id)
            .or_insert_with(|| RestartState::new(now));

        if (now - state.window_started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
            > self.policy.restart_counter_reset_after
        {
            state.count = 0;
            state.window_started_at = now;
        }

        if let Some(last_restart_at) = state.last_restart_at {
            if (now - last_restart_at).to_std().unwrap_or(Duration::ZERO) < self.policy.restart_cooldown {
                let alert = Alert::new(
                    worker_id,
                    AlertKind::RestartRateLimited,
                    AlertSeverity::Warning,
                    "restart suppressed: within cooldown window",
                );
                self.alerts.push(alert.clone());
                raised.push(alert);
                return None;
            }
        }

        if state.count >= self.policy.max_restart_attempts {
            let alert = Alert::new(
                worker_id,
                AlertKind::RestartExhausted,
                AlertSeverity::Critical,
                "restart budget exhausted for this worker",
            );
            self.alerts.push(alert.clone());
            raised.push(alert);
            return None;
        }

        state.count += 1;
        state.last_restart_at = Some(now);
        info!(worker_id = %worker_id, attempt = state.count, "restarting unhealthy worker");
        Some(HealthAction { worker_id })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::worker::WorkerState;

    fn worker_with_last_heartbeat(age: Duration) -> WorkerInfo {
        let mut info = WorkerInfo::new(WorkerId::new(), 100);
        info.state = WorkerState::Ready;
        info.last_heartbeat_at = Some(Utc::now() - chrono::Duration::from_std(age).unwrap());
        info
    }

    #[test]
    fn missed_heartbeat_triggers_restart() {
        let mut config = PoolConfig::default();
        config.heartbeat_timeout_ms = Duration::from_secs(1);
        config.zombie_threshold_ms = Duration::from_secs(10);
        let mut monitor = HealthMonitor::new(&config);

        let worker = worker_with_last_heartbeat(Duration::from_secs(2));
        let (actions, _) = monitor.scan(&[worker.clone()], Utc::now());
        assert_eq!(actions, vec![HealthAction { worker_id: worker.id }]);
    }

    #[test]
    fn healthy_worker_produces_no_action() {
        let config = PoolConfig::default();
        let mut monitor = HealthMonitor::new(&config);
        let worker = worker_with_last_heartbeat(Duration::from_millis(10));
        let (actions, _) = monitor.scan(&[worker], Utc::now());
        assert!(actions.is_empty());
    }

    #[test]
    fn restart_cooldown_suppresses_rapid_repeat_restarts() {
        let mut config = PoolConfig::default();
        config.heartbeat_timeout_ms = Duration::from_millis(1);
        config.zombie_threshold_ms = Duration::from_secs(10);
        config.restart_cooldown_ms = Duration::from_secs(60);
        let mut monitor = HealthMonitor::new(&config);

        let worker = worker_with_last_heartbeat(Duration::from_secs(1));
        let now = Utc::now();
        let (first, _) = monitor.scan(&[worker.clone()], now);
        assert_eq!(first.len(), 1);

        let (second, _) = monitor.scan(&[worker], now);
        assert!(second.is_empty());
    }

    #[test]
    fn restart_budget_exhaustion_stops_further_restarts() {
        let mut config = PoolConfig::default();
        config.heartbeat_timeout_ms = Duration::from_millis(1);
        config.zombie_threshold_ms = Duration::from_secs(10);
        config.restart_cooldown_ms = Duration::from_millis(1);
        config.max_restart_attempts = 2;
        let mut monitor = HealthMonitor::new(&config);
        let worker = worker_with_last_heartbeat(Duration::from_secs(1));

        let mut now = Utc::now();
        for _ in 0..2 {
            let (actions, _) = monitor.scan(&[worker.clone()], now);
            assert_eq!(actions.len(), 1);
            now += chrono::Duration::milliseconds(5);
        }
        let (exhausted, _) = monitor.scan(&[worker], now);
        assert!(exhausted.is_empty());
    }

    #[test]
    fn snapshot_reports_healthy_with_no_issues() {
        let config = PoolConfig::default();
        let monitor = HealthMonitor::new(&config);
        let workers = vec![worker_with_last_heartbeat(Duration::from_millis(10)); 4];
        let report = monitor.snapshot(&workers, Utc::now());
        assert_eq!(report.status, OverallStatus::Healthy);
        assert_eq!(report.healthy_workers, 4);
        assert_eq!(report.total_workers, 4);
    }

    #[test]
    fn snapshot_reports_critical_when_most_workers_are_unhealthy() {
        let mut config = PoolConfig::default();
        config.heartbeat_timeout_ms = Duration::from_millis(1);
        let monitor = HealthMonitor::new(&config);
        let workers = vec![worker_with_last_heartbeat(Duration::from_secs(1)); 4];
        let report = monitor.snapshot(&workers, Utc::now());
        assert_eq!(report.status, OverallStatus::Critical);
        assert_eq!(report.healthy_workers, 0);
    }

    #[test]
    fn snapshot_reports_degraded_in_the_fifty_to_eighty_percent_band() {
        let mut config = PoolConfig::default();
        config.heartbeat_timeout_ms = Duration::from_millis(1);
        let monitor = HealthMonitor::new(&config);
        let mut workers = vec![worker_with_last_heartbeat(Duration::from_secs(1)); 5];
        workers[0].last_heartbeat_at = Some(Utc::now());
        workers[1].last_heartbeat_at = Some(Utc::now());
        workers[2].last_heartbeat_at = Some(Utc::now());
        let report = monitor.snapshot(&workers, Utc::now());
        assert_eq!(report.healthy_workers, 3);
        assert_eq!(report.status, OverallStatus::Degraded);
    }

    #[test]
    fn high_memory_without_restart_on_memory_only_warns() {
        let mut config = PoolConfig::default();
        config.worker_memory_threshold_mb = 1;
        config.restart_on_memory = false;
        let mut monitor = HealthMonitor::new(&config);

        let mut worker = worker_with_last_heartbeat(Duration::from_millis(1));
        worker.memory_bytes = 10 * 1024 * 1024;
        let (actions, raised) = monitor.scan(&[worker], Utc::now());
        assert!(actions.is_empty());
        assert!(raised.iter().any(|a| a.kind == AlertKind::HighMemory));
    }
}
