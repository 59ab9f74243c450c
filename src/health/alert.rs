//! Health-monitor alerts (spec §3 "Alert", §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::{AlertId, WorkerId};

/// How serious an alert is. `Critical` alerts are the ones that drive
/// restart decisions; `Warning` alerts are informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// What condition the health monitor observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    MissedHeartbeats,
    Zombie,
    HighMemory,
    RestartRateLimited,
    RestartExhausted,
}

/// One health-monitor observation, retained in a bounded ring buffer for
/// the public `Subscribe`/metrics surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub worker_id: WorkerId,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(worker_id: WorkerId, kind: AlertKind, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            id: AlertId::new(),
            worker_id,
            kind,
            severity,
            message: message.into(),
            observed_at: Utc::now(),
        }
    }
}

/// Fixed-capacity FIFO ring buffer of recent alerts.
#[derive(Debug, Default)]
pub struct AlertLog {
    capacity: usize,
    alerts: std::collections::VecDeque<Alert>,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            alerts: std::collections::VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, alert: Alert) {
        if self.alerts.len() >= self.capacity.max(1) {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    pub fn recent(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
