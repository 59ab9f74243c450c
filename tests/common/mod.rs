//! Shared test scaffolding: every integration test spawns real `echo_worker`
//! subprocesses via `PoolConfig::worker_exe_override`, the same code path a
//! production pool uses to re-exec itself.

use std::path::PathBuf;
use std::time::Duration;

use taskpool::PoolConfigBuilder;

/// A `PoolConfigBuilder` pre-wired to spawn `echo_worker` fixture processes,
/// with short timers so the scenarios below don't need to wait minutes.
pub fn fixture_config() -> PoolConfigBuilder {
    let worker_exe = PathBuf::from(env!("CARGO_BIN_EXE_echo_worker"));
    taskpool::PoolConfig::builder()
        .worker_exe_override(Some(worker_exe))
        .heartbeat_interval_ms(Duration::from_millis(50))
        .heartbeat_timeout_ms(Duration::from_millis(500))
        .zombie_threshold_ms(Duration::from_millis(1000))
        .health_check_interval_ms(Duration::from_millis(50))
        .retry_backoff_ms(Duration::from_millis(20))
        .max_backoff_ms(Duration::from_millis(100))
        .restart_cooldown_ms(Duration::from_millis(50))
        .completed_task_retention_ms(Duration::from_millis(500))
        .shutdown_grace_ms(Duration::from_millis(300))
}
