//! Worker fixture binary used by the integration tests.
//!
//! This binary is never run directly by a user — `Pool::start` with
//! `PoolConfig::worker_exe_override` pointed at this binary's path spawns it
//! the same way a production `Pool` re-execs its own binary. It registers
//! a small set of handlers integration tests assert against.

#![allow(clippy::panic)]

use serde_json::{json, Value};
use taskpool::worker::{maybe_enter_worker_mode, HandlerRegistry};

fn main() {
    let registry = HandlerRegistry::new()
        .register("echo", |payload: Value| async move { Ok(payload) })
        .register("sleep", |payload: Value| async move {
            let ms = payload.get("ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            Ok(json!({ "slept_ms": ms }))
        })
        .register("fail", |_payload: Value| async move {
            Err("handler intentionally failed".to_string())
        })
        .register("panic", |_payload: Value| async move {
            panic!("handler intentionally panicked");
        })
        .register("crash", |_payload: Value| async move { std::process::exit(1) })
        .register("crash_once", |payload: Value| async move {
            // Marker file persists across the process restart a crash
            // triggers, so the replacement worker's attempt can tell it's
            // not the first and should actually complete the task.
            let marker = payload.get("marker").and_then(Value::as_str).unwrap_or_default();
            if std::path::Path::new(marker).exists() {
                Ok(json!({ "recovered": true }))
            } else {
                let _ = std::fs::write(marker, b"crashed-once");
                std::process::exit(1)
            }
        });

    maybe_enter_worker_mode(registry);
}
