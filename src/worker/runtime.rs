//! The worker-side runtime: handler dispatch, heartbeats, and graceful
//! shutdown for a process that has been re-exec'd into worker mode (spec
//! §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use crate::message::{ChildMessage, ErrorInfo, IpcChannel, IpcError, ParentMessage, WorkerLogLevel};
use crate::util::TaskId;
use crate::worker::types::WorkerState;

/// A unit of work a worker knows how to execute, keyed by task type.
///
/// Implementations run inside the worker process, not the supervisor —
/// register only handlers safe to execute in a short-lived child process.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<Value, String>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, String>> + Send,
{
    async fn handle(&self, payload: Value) -> Result<Value, String> {
        (self)(payload).await
    }
}

/// Maps task type names to the handler that executes them.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, task_type: impl Into<String>, handler: impl TaskHandler + 'static) -> Self {
        self.handlers.insert(task_type.into(), Arc::new(handler));
        self
    }

    fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }
}

/// Failures bootstrapping the worker-mode runtime itself, as opposed to
/// failures executing a task (those become `ChildMessage::TaskFailed`).
#[derive(Debug, Error)]
pub enum WorkerRuntimeError {
    #[error("WORKER_ID is not valid: {0}")]
    InvalidWorkerId(String),
    #[error("ipc channel error: {0}")]
    Ipc(#[from] IpcError),
    #[error("task handler panicked")]
    HandlerPanicked,
}

/// If the process environment marks this as a worker (`WORKER_ID` set),
/// run the worker loop to completion and exit the process; otherwise return
/// immediately so the caller's `main` continues as the supervisor.
///
/// Call this at the very top of `main`, before parsing any supervisor-side
/// arguments.
pub fn maybe_enter_worker_mode(registry: HandlerRegistry) {
    if std::env::var_os("WORKER_ID").is_none() {
        return;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to start worker-mode tokio runtime");

    let exit_code = match runtime.block_on(run_worker(registry)) {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "worker runtime exited with an error");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run_worker(registry: HandlerRegistry) -> Result<(), WorkerRuntimeError> {
    let heartbeat_interval = std::env::var("WORKER_HEARTBEAT_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5));
    let shutdown_grace = std::env::var("WORKER_SHUTDOWN_GRACE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30));

    let mut channel = IpcChannel::new(tokio::io::stdin(), tokio::io::stdout());

    let mut state = WorkerState::Initializing;
    let mut tasks_executed: u64 = 0;
    let mut current_task: Option<(TaskId, tokio::task::JoinHandle<Result<Value, String>>)> = None;

    channel.send(&ChildMessage::WorkerReady).await?;
    state = WorkerState::Ready;

    let mut heartbeat_ticker = time::interval(heartbeat_interval);
    heartbeat_ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = heartbeat_ticker.tick() => {
                send_heartbeat(&mut channel, state, tasks_executed, &current_task).await?;
            }

            message = channel.receive::<ParentMessage>() => {
                match message {
                    Ok(ParentMessage::HealthCheck) => {
                        send_heartbeat(&mut channel, state, tasks_executed, &current_task).await?;
                    }
                    Ok(ParentMessage::ExecuteTask { task }) => {
                        if current_task.is_some() {
                            warn!(task_id = %task.id, "execute-task while already busy; rejecting");
                            channel.send(&ChildMessage::TaskFailed {
                                task_id: task.id,
                                error: ErrorInfo { message: "worker already busy".into(), kind: "protocol-error".into() },
                                duration_ms: 0,
                            }).await?;
                            continue;
                        }
                        state = WorkerState::Busy;
                        let task_id = task.id;
                        let handler = registry.get(&task.task_type);
                        let payload = task.payload.clone();
                        let join = tokio::spawn(async move {
                            match handler {
                                Some(handler) => handler.handle(payload).await,
                                None => Err("no-handler".to_string()),
                            }
                        });
                        current_task = Some((task_id, join));
                    }
                    Ok(ParentMessage::Shutdown { graceful }) => {
                        state = WorkerState::ShuttingDown;
                        if let Some((task_id, join)) = current_task.take() {
                            if graceful {
                                info!(task_id = %task_id, "draining current task before shutdown");
                                match time::timeout(shutdown_grace, join).await {
                                    Ok(Ok(outcome)) => {
                                        tasks_executed += 1;
                                        match outcome {
                                            Ok(value) => {
                                                channel.send(&ChildMessage::TaskComplete { task_id, result: value, duration_ms: 0 }).await?;
                                            }
                                            Err(message) => {
                                                let kind = if message == "no-handler" { "no-handler" } else { "handler-error" };
                                                channel.send(&ChildMessage::TaskFailed {
                                                    task_id,
                                                    error: ErrorInfo { message, kind: kind.into() },
                                                    duration_ms: 0,
                                                }).await?;
                                            }
                                        }
                                    }
                                    Ok(Err(_)) => {
                                        channel.send(&ChildMessage::TaskFailed {
                                            task_id,
                                            error: ErrorInfo { message: "worker task panicked".into(), kind: "handler-error".into() },
                                            duration_ms: 0,
                                        }).await?;
                                    }
                                    Err(_) => {
                                        warn!(task_id = %task_id, "task still running past shutdown grace, aborting");
                                        channel.send(&ChildMessage::TaskFailed {
                                            task_id,
                                            error: ErrorInfo { message: "shutdown grace period exceeded".into(), kind: "task-timeout".into() },
                                            duration_ms: 0,
                                        }).await?;
                                    }
                                }
                            } else {
                                join.abort();
                            }
                        }
                        break;
                    }
                    Err(IpcError::Closed) => {
                        info!("supervisor pipe closed, exiting");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "protocol error from supervisor, exiting");
                        let _ = channel.send(&ChildMessage::WorkerError {
                            error: err.to_string(),
                            fatal: true,
                        }).await;
                        break;
                    }
                }
            }

            result = wait_current(&mut current_task), if current_task.is_some() => {
                let (task_id, outcome, started_at) = result;
                current_task = None;
                let duration_ms = started_at.elapsed().as_millis() as u64;
                match outcome {
                    TaskOutcome::Completed(Ok(value)) => {
                        tasks_executed += 1;
                        state = WorkerState::Ready;
                        channel.send(&ChildMessage::TaskComplete { task_id, result: value, duration_ms }).await?;
                        report_memory_if_high(&mut channel).await?;
                    }
                    TaskOutcome::Completed(Err(message)) => {
                        tasks_executed += 1;
                        state = WorkerState::Ready;
                        let kind = if message == "no-handler" { "no-handler" } else { "handler-error" };
                        channel.send(&ChildMessage::TaskFailed {
                            task_id,
                            error: ErrorInfo { message, kind: kind.into() },
                            duration_ms,
                        }).await?;
                        report_memory_if_high(&mut channel).await?;
                    }
                    TaskOutcome::Panicked => {
                        state = WorkerState::Error;
                        error!(task_id = %task_id, "task handler panicked, exiting worker");
                        channel.send(&ChildMessage::TaskFailed {
                            task_id,
                            error: ErrorInfo { message: "worker task panicked".into(), kind: "handler-error".into() },
                            duration_ms,
                        }).await?;
                        channel.send(&ChildMessage::WorkerError {
                            error: "task handler panicked".into(),
                            fatal: true,
                        }).await?;
                        return Err(WorkerRuntimeError::HandlerPanicked);
                    }
                }
            }
        }
    }

    channel
        .send(&ChildMessage::WorkerShutdown { tasks_executed })
        .await?;
    Ok(())
}

/// A completed task run, distinguishing an ordinary handler `Err` (worker
/// stays in service) from a panic inside the handler (worker must not keep
/// accepting work, spec §4.5).
enum TaskOutcome {
    Completed(Result<Value, String>),
    Panicked,
}

/// Await the in-flight task, if any, alongside its start time for duration
/// accounting. Only polled by `select!` when `current_task.is_some()`.
async fn wait_current(
    current_task: &mut Option<(TaskId, tokio::task::JoinHandle<Result<Value, String>>)>,
) -> (TaskId, TaskOutcome, Instant) {
    let started_at = Instant::now();
    let (task_id, join) = current_task.as_mut().expect("guarded by select! if");
    let task_id = *task_id;
    let outcome = match join.await {
        Ok(result) => TaskOutcome::Completed(result),
        Err(_) => TaskOutcome::Panicked,
    };
    (task_id, outcome, started_at)
}

async fn send_heartbeat<R, W>(
    channel: &mut IpcChannel<R, W>,
    state: WorkerState,
    tasks_executed: u64,
    current_task: &Option<(TaskId, tokio::task::JoinHandle<Result<Value, String>>)>,
) -> Result<(), IpcError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let (user_ms, sys_ms) = cpu_times_ms();
    channel
        .send(&ChildMessage::Heartbeat {
            state,
            tasks_executed,
            memory_bytes: current_memory_bytes(),
            cpu_user_ms: user_ms,
            cpu_sys_ms: sys_ms,
            current_task_id: current_task.as_ref().map(|(id, _)| *id),
        })
        .await
}

async fn report_memory_if_high<R, W>(channel: &mut IpcChannel<R, W>) -> Result<(), IpcError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let bytes = current_memory_bytes();
    if bytes > memory_warn_threshold_bytes() {
        channel
            .send(&ChildMessage::HighMemoryWarning { bytes })
            .await?;
    }
    Ok(())
}

/// `WORKER_MEMORY_WARN_THRESHOLD_MB` set by the supervisor from
/// `PoolConfig.worker_memory_threshold_mb` (spec §4.3); 512MB if unset or
/// unparseable, matching that field's own default.
fn memory_warn_threshold_bytes() -> u64 {
    std::env::var("WORKER_MEMORY_WARN_THRESHOLD_MB")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(512)
        * 1024
        * 1024
}

/// Resident set size for this process, in bytes. Linux-only; other
/// platforms report 0 and rely on the supervisor's own process accounting.
#[cfg(target_os = "linux")]
fn current_memory_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status.lines().find_map(|line| {
                line.strip_prefix("VmRSS:").map(|rest| {
                    rest.trim()
                        .trim_end_matches(" kB")
                        .parse::<u64>()
                        .unwrap_or(0)
                        * 1024
                })
            })
        })
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn current_memory_bytes() -> u64 {
    0
}

/// User/system CPU time consumed by this process so far, in milliseconds.
#[cfg(unix)]
fn cpu_times_ms() -> (u64, u64) {
    match nix::sys::resource::getrusage(nix::sys::resource::UsageWho::RUSAGE_SELF) {
        Ok(usage) => {
            let to_ms = |tv: nix::sys::time::TimeVal| -> u64 {
                (tv.tv_sec().max(0) as u64) * 1000 + (tv.tv_usec().max(0) as u64) / 1000
            };
            (to_ms(usage.user_time()), to_ms(usage.system_time()))
        }
        Err(_) => (0, 0),
    }
}

#[cfg(not(unix))]
fn cpu_times_ms() -> (u64, u64) {
    (0, 0)
}

#[allow(dead_code)]
fn _silence_unused_log_level(_: WorkerLogLevel) {}
