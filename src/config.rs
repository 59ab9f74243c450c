//! Pool configuration with sensible defaults and a validating builder.
//!
//! Every option in the spec's "Configuration" table (§6) is a field here.
//! `PoolConfig` is immutable once the pool starts, matching the `Pool`
//! invariant in the data model ("`config` (immutable after start)").

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::balancer::Strategy as LoadBalancingStrategy;
use crate::error::PoolError;

/// What `Submit` does when `max_queue_depth` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Suspend the caller until space frees up (the default).
    #[default]
    Block,
    /// Return `PoolError::QueueFull` immediately.
    Reject,
}

/// Immutable pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    // --- pool bounds ---
    pub pool_size: usize,
    pub min_workers: usize,
    pub max_workers: usize,

    // --- heartbeat / health ---
    #[serde(with = "crate::util::duration_ms")]
    pub heartbeat_interval_ms: Duration,
    #[serde(with = "crate::util::duration_ms")]
    pub heartbeat_timeout_ms: Duration,
    #[serde(with = "crate::util::duration_ms")]
    pub zombie_threshold_ms: Duration,
    #[serde(with = "crate::util::duration_ms")]
    pub health_check_interval_ms: Duration,

    // --- task timing / retry ---
    #[serde(with = "crate::util::duration_ms")]
    pub task_timeout_ms: Duration,
    pub max_task_retries: u32,
    #[serde(with = "crate::util::duration_ms")]
    pub retry_backoff_ms: Duration,
    #[serde(with = "crate::util::duration_ms")]
    pub max_backoff_ms: Duration,

    // --- load balancing ---
    pub load_balancing: LoadBalancingStrategy,

    // --- restart policy ---
    pub auto_restart: bool,
    pub max_restart_attempts: u32,
    #[serde(with = "crate::util::duration_ms")]
    pub restart_cooldown_ms: Duration,
    #[serde(with = "crate::util::duration_ms")]
    pub restart_counter_reset_after_ms: Duration,

    // --- memory ---
    pub worker_memory_threshold_mb: u64,
    pub restart_on_memory: bool,

    // --- back-pressure ---
    pub max_queue_depth: usize,
    pub submit_on_overflow: OverflowPolicy,

    // --- autoscaling ---
    pub auto_scale: bool,
    pub scale_up_queue_threshold: usize,
    pub scale_down_idle_threshold: usize,
    pub scale_step: usize,
    #[serde(with = "crate::util::duration_ms")]
    pub scale_interval_ms: Duration,

    // --- shutdown ---
    #[serde(with = "crate::util::duration_ms")]
    pub shutdown_grace_ms: Duration,

    // --- completion bookkeeping ---
    #[serde(with = "crate::util::duration_ms")]
    pub completed_task_retention_ms: Duration,

    /// Executable to re-exec for new worker processes. `None` (the default)
    /// re-execs `std::env::current_exe()`; set only by test harnesses that
    /// need a dedicated worker fixture binary distinct from the test runner.
    #[serde(skip)]
    pub worker_exe_override: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            min_workers: 1,
            max_workers: 16,

            heartbeat_interval_ms: Duration::from_secs(5),
            heartbeat_timeout_ms: Duration::from_secs(15),
            zombie_threshold_ms: Duration::from_secs(30),
            health_check_interval_ms: Duration::from_secs(5),

            task_timeout_ms: Duration::from_secs(300),
            max_task_retries: 3,
            retry_backoff_ms: Duration::from_secs(1),
            max_backoff_ms: Duration::from_secs(30),

            load_balancing: LoadBalancingStrategy::RoundRobin,

            auto_restart: true,
            max_restart_attempts: 3,
            restart_cooldown_ms: Duration::from_secs(5),
            restart_counter_reset_after_ms: Duration::from_secs(300),

            worker_memory_threshold_mb: 512,
            restart_on_memory: false,

            max_queue_depth: 10_000,
            submit_on_overflow: OverflowPolicy::Block,

            auto_scale: false,
            scale_up_queue_threshold: 50,
            scale_down_idle_threshold: 5,
            scale_step: 10,
            scale_interval_ms: Duration::from_secs(30),

            shutdown_grace_ms: Duration::from_secs(300),
            completed_task_retention_ms: Duration::from_secs(60),

            worker_exe_override: None,
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Validate cross-field invariants that a plain `Default` can't enforce.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.min_workers > self.max_workers {
            return Err(PoolError::InvalidConfiguration {
                reason: format!(
                    "min_workers ({}) must be <= max_workers ({})",
                    self.min_workers, self.max_workers
                ),
            });
        }
        if self.pool_size < self.min_workers || self.pool_size > self.max_workers {
            return Err(PoolError::InvalidConfiguration {
                reason: format!(
                    "pool_size ({}) must be within [min_workers, max_workers] = [{}, {}]",
                    self.pool_size, self.min_workers, self.max_workers
                ),
            });
        }
        if self.max_workers == 0 {
            return Err(PoolError::InvalidConfiguration {
                reason: "max_workers must be at least 1".into(),
            });
        }
        if self.zombie_threshold_ms <= self.heartbeat_timeout_ms {
            return Err(PoolError::InvalidConfiguration {
                reason: "zombie_threshold_ms must be greater than heartbeat_timeout_ms".into(),
            });
        }
        if self.max_backoff_ms < self.retry_backoff_ms {
            return Err(PoolError::InvalidConfiguration {
                reason: "max_backoff_ms must be >= retry_backoff_ms".into(),
            });
        }
        if self.max_queue_depth == 0 {
            return Err(PoolError::InvalidConfiguration {
                reason: "max_queue_depth must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Builder for [`PoolConfig`], starting from `PoolConfig::default()`.
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

macro_rules! setter {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.config.$name = value;
            self
        }
    };
}

impl PoolConfigBuilder {
    setter!(pool_size, usize);
    setter!(min_workers, usize);
    setter!(max_workers, usize);
    setter!(heartbeat_interval_ms, Duration);
    setter!(heartbeat_timeout_ms, Duration);
    setter!(zombie_threshold_ms, Duration);
    setter!(health_check_interval_ms, Duration);
    setter!(task_timeout_ms, Duration);
    setter!(max_task_retries, u32);
    setter!(retry_backoff_ms, Duration);
    setter!(max_backoff_ms, Duration);
    setter!(load_balancing, LoadBalancingStrategy);
    setter!(auto_restart, bool);
    setter!(max_restart_attempts, u32);
    setter!(restart_cooldown_ms, Duration);
    setter!(restart_counter_reset_after_ms, Duration);
    setter!(worker_memory_threshold_mb, u64);
    setter!(restart_on_memory, bool);
    setter!(max_queue_depth, usize);
    setter!(submit_on_overflow, OverflowPolicy);
    setter!(auto_scale, bool);
    setter!(scale_up_queue_threshold, usize);
    setter!(scale_down_idle_threshold, usize);
    setter!(scale_step, usize);
    setter!(scale_interval_ms, Duration);
    setter!(shutdown_grace_ms, Duration);
    setter!(completed_task_retention_ms, Duration);
    setter!(worker_exe_override, Option<PathBuf>);

    /// Validate and produce the final configuration.
    pub fn build(self) -> Result<PoolConfig, PoolError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
