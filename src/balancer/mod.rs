//! Worker selection strategies (spec §4.4).
//!
//! Dispatch only ever considers workers already known to be `Ready` — the
//! dispatch context in [`crate::supervisor`] filters the worker map before
//! calling [`LoadBalancer::select`], so this module never needs to know
//! about worker state beyond the candidate list it's handed.

use serde::{Deserialize, Serialize};

use crate::util::WorkerId;

/// Which algorithm picks the next worker for a ready-to-dispatch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Cycle through ready workers in a fixed order.
    RoundRobin,
    /// Prefer the ready worker with the fewest in-flight tasks, breaking
    /// ties by id order for determinism.
    LeastLoaded,
}

/// A ready worker as seen by the balancer: just enough to pick among them.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub id: WorkerId,
    pub in_flight: usize,
}

/// Stateful selector: round robin needs a cursor across calls, so this is a
/// small struct rather than a free function.
#[derive(Debug)]
pub struct LoadBalancer {
    strategy: Strategy,
    cursor: usize,
}

impl LoadBalancer {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy, cursor: 0 }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Pick one candidate out of `candidates`, which must be non-empty and
    /// already filtered to `Ready` workers. Returns `None` only when empty.
    pub fn select(&mut self, candidates: &[Candidate]) -> Option<WorkerId> {
        if candidates.is_empty() {
            return None;
        }
        match self.strategy {
            Strategy::RoundRobin => {
                let index = self.cursor % candidates.len();
                self.cursor = self.cursor.wrapping_add(1);
                Some(candidates[index].id)
            }
            Strategy::LeastLoaded => candidates
                .iter()
                .min_by(|a, b| a.in_flight.cmp(&b.in_flight).then_with(|| a.id.cmp(&b.id)))
                .map(|c| c.id),
        }
    }
}
