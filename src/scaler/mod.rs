//! Auto-scaling evaluator: periodically compares queue depth and idle
//! worker count against thresholds and proposes a scale step (spec §4.7).

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::PoolConfig;

/// What the scaler decided to do on one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    ScaleUp { by: usize },
    ScaleDown { by: usize },
    Hold,
}

#[derive(Debug, Clone, Copy)]
struct ScalerPolicy {
    enabled: bool,
    scale_up_queue_threshold: usize,
    scale_down_idle_threshold: usize,
    scale_step: usize,
    min_workers: usize,
    max_workers: usize,
}

impl From<&PoolConfig> for ScalerPolicy {
    fn from(config: &PoolConfig) -> Self {
        Self {
            enabled: config.auto_scale,
            scale_up_queue_threshold: config.scale_up_queue_threshold,
            scale_down_idle_threshold: config.scale_down_idle_threshold,
            scale_step: config.scale_step,
            min_workers: config.min_workers,
            max_workers: config.max_workers,
        }
    }
}

/// Evaluates queue depth and idle-worker counts against configured
/// thresholds on a fixed interval, owned by the same timer context that
/// drives the health monitor's scan.
pub struct Scaler {
    policy: ScalerPolicy,
    last_evaluated_at: Option<DateTime<Utc>>,
}

impl Scaler {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            policy: ScalerPolicy::from(config),
            last_evaluated_at: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }

    /// Decide whether to scale, given the current queue depth, busy worker
    /// count, and total worker count. `now` is recorded purely for
    /// observability (`last_evaluated_at`); the decision itself is
    /// stateless given the inputs.
    ///
    /// Scale-down only fires when the queue is fully drained: a pool can
    /// have plenty of idle-looking capacity and still have work queued up
    /// behind a slow handler type, so `queue_depth == 0` gates the decision
    /// alongside the busy-worker threshold (spec §4.7).
    pub fn evaluate(
        &mut self,
        queue_depth: usize,
        busy_workers: usize,
        total_workers: usize,
        now: DateTime<Utc>,
    ) -> ScaleDecision {
        self.last_evaluated_at = Some(now);
        if !self.policy.enabled {
            return ScaleDecision::Hold;
        }

        if queue_depth > self.policy.scale_up_queue_threshold && total_workers < self.policy.max_workers {
            let room = self.policy.max_workers - total_workers;
            let by = self.policy.scale_step.min(room);
            if by > 0 {
                info!(queue_depth, total_workers, by, "scaling up");
                return ScaleDecision::ScaleUp { by };
            }
        }

        if queue_depth == 0 && busy_workers < self.policy.scale_down_idle_threshold && total_workers > self.policy.min_workers {
            let idle_workers = total_workers - busy_workers;
            let room = total_workers - self.policy.min_workers;
            let by = self.policy.scale_step.min(room).min(idle_workers);
            if by > 0 {
                info!(busy_workers, total_workers, by, "scaling down");
                return ScaleDecision::ScaleDown { by };
            }
        }

        ScaleDecision::Hold
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config(auto_scale: bool) -> PoolConfig {
        let mut config = PoolConfig::default();
        config.auto_scale = auto_scale;
        config.min_workers = 2;
        config.max_workers = 10;
        config.scale_up_queue_threshold = 5;
        config.scale_down_idle_threshold = 3;
        config.scale_step = 2;
        config
    }

    #[test]
    fn disabled_scaler_always_holds() {
        let mut scaler = Scaler::new(&config(false));
        let decision = scaler.evaluate(1000, 0, 2, Utc::now());
        assert_eq!(decision, ScaleDecision::Hold);
    }

    #[test]
    fn scales_up_when_queue_depth_exceeds_threshold() {
        let mut scaler = Scaler::new(&config(true));
        let decision = scaler.evaluate(10, 0, 4, Utc::now());
        assert_eq!(decision, ScaleDecision::ScaleUp { by: 2 });
    }

    #[test]
    fn scale_up_is_capped_by_max_workers() {
        let mut scaler = Scaler::new(&config(true));
        let decision = scaler.evaluate(10, 0, 9, Utc::now());
        assert_eq!(decision, ScaleDecision::ScaleUp { by: 1 });
    }

    #[test]
    fn scales_down_when_queue_empty_and_busy_below_threshold() {
        let mut scaler = Scaler::new(&config(true));
        let decision = scaler.evaluate(0, 1, 8, Utc::now());
        assert_eq!(decision, ScaleDecision::ScaleDown { by: 2 });
    }

    #[test]
    fn scale_down_never_drops_below_min_workers() {
        let mut scaler = Scaler::new(&config(true));
        let decision = scaler.evaluate(0, 1, 3, Utc::now());
        assert_eq!(decision, ScaleDecision::ScaleDown { by: 1 });
    }

    #[test]
    fn holds_when_queue_nonempty_even_with_busy_below_threshold() {
        let mut scaler = Scaler::new(&config(true));
        let decision = scaler.evaluate(2, 1, 8, Utc::now());
        assert_eq!(decision, ScaleDecision::Hold);
    }

    #[test]
    fn holds_when_within_thresholds() {
        let mut scaler = Scaler::new(&config(true));
        let decision = scaler.evaluate(0, 4, 4, Utc::now());
        assert_eq!(decision, ScaleDecision::Hold);
    }
}
