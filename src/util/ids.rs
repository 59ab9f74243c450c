//! Opaque identifiers used throughout the pool.
//!
//! Every identifier is a UUID newtype so that tasks, workers and alerts can
//! never be confused with one another at the type level, following the same
//! pattern the rest of the crate uses for every other domain type.

// Standard library imports
use std::fmt;

// Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task, assigned by the supervisor at `Submit` time.
///
/// Stable for the lifetime of the process; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a new random task id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a worker, stable across that worker's restarts.
///
/// A restarted worker keeps its `WorkerId` — only its `pid` changes — so
/// that health-monitor history and restart counters carry over correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Generate a new random worker id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a health-monitor alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Generate a new random alert id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
        assert_ne!(WorkerId::new(), WorkerId::new());
        assert_ne!(AlertId::new(), AlertId::new());
    }

    #[test]
    fn ids_display_as_uuid_text() {
        let id = TaskId::new();
        assert_eq!(id.to_string().len(), 36);
    }
}
