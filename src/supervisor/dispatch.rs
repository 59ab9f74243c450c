//! The single-writer dispatch context: one task owns the worker registry,
//! the task queue and every in-flight submission, and drives all of it
//! from one `select!` loop (spec §4.6, §5, §9).

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::balancer::{Candidate, LoadBalancer};
use crate::config::PoolConfig;
use crate::error::{PoolError, TaskError, TaskErrorKind};
use crate::events::{EventBus, PoolEvent};
use crate::health::HealthMonitor;
use crate::message::{ChildMessage, ParentMessage};
use crate::metrics::PoolMetrics;
use crate::scaler::{ScaleDecision, Scaler};
use crate::task::{CancellationToken, DequeueOutcome, FailOutcome, Task, TaskQueue};
use crate::util::{TaskId, WorkerId};
use crate::worker::{WorkerEvent, WorkerHandle, WorkerInfo, WorkerState};

/// Cadence of the combined retry/timeout/eviction maintenance scan. A
/// single periodic tick drives all three instead of one timer per task.
const MAINTENANCE_TICK: Duration = Duration::from_millis(100);

pub struct SubmitCommand {
    pub task: Task,
    pub reply: oneshot::Sender<Result<Value, TaskError>>,
    pub cancellation: Option<CancellationToken>,
}

pub enum ControlCommand {
    ScaleUp {
        by: usize,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    ScaleDown {
        by: usize,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    Shutdown {
        graceful: bool,
        reply: oneshot::Sender<Result<(), PoolError>>,
    },
    WorkerStatus {
        id: WorkerId,
        reply: oneshot::Sender<Option<WorkerInfo>>,
    },
    AllWorkers {
        reply: oneshot::Sender<Vec<WorkerInfo>>,
    },
    Metrics {
        reply: oneshot::Sender<PoolMetrics>,
    },
    Subscribe {
        reply: oneshot::Sender<mpsc::Receiver<PoolEvent>>,
    },
}

struct WorkerEntry {
    handle: WorkerHandle,
    info: WorkerInfo,
}

struct DispatchContext {
    config: PoolConfig,
    queue: TaskQueue,
    workers: HashMap<WorkerId, WorkerEntry>,
    balancer: LoadBalancer,
    health: HealthMonitor,
    scaler: Scaler,
    events: EventBus,
    pending_replies: HashMap<TaskId, oneshot::Sender<Result<Value, TaskError>>>,
    /// Tokens for tasks still sitting in the queue, checked on the same
    /// maintenance tick that drives retry/timeout eviction. A worker never
    /// hears about cancellation, so a token fired after dispatch is a no-op.
    cancellations: HashMap<TaskId, CancellationToken>,
    worker_events_tx: mpsc::Sender<(WorkerId, WorkerEvent)>,
    total_restarts: u64,
    /// Lifetime count of worker processes ever spawned (initial pool plus
    /// every restart/scale-up), for `PoolMetrics::workers_spawned` and the
    /// reuse-rate invariant (spec §8).
    workers_spawned: u64,
    /// Lifetime count of tasks that reached `task-complete`.
    completed_tasks: u64,
    shutting_down: bool,
    shutdown_reply: Option<oneshot::Sender<Result<(), PoolError>>>,
    shutdown_graceful: bool,
    shutdown_deadline: Option<chrono::DateTime<Utc>>,
    /// Whether `shutdown` has been sent to every worker yet. A graceful
    /// shutdown defers this until the queue has drained (or the grace
    /// deadline passes), so workers keep accepting dispatched work in the
    /// meantime instead of exiting as soon as their current task finishes.
    shutdown_workers_notified: bool,
}

/// Validate and spin up the initial workers, then hand the dispatch context
/// off to a background task.
pub async fn run_dispatch_loop(
    config: PoolConfig,
    submit_rx: mpsc::Receiver<SubmitCommand>,
    control_rx: mpsc::Receiver<ControlCommand>,
) -> Result<(), PoolError> {
    let (worker_events_tx, worker_events_rx) = mpsc::channel(1024);
    let events = EventBus::default();
    let mut ctx = DispatchContext {
        balancer: LoadBalancer::new(config.load_balancing),
        health: HealthMonitor::new(&config),
        scaler: Scaler::new(&config),
        queue: TaskQueue::new(&config),
        events: events.clone(),
        workers: HashMap::new(),
        pending_replies: HashMap::new(),
        cancellations: HashMap::new(),
        worker_events_tx,
        total_restarts: 0,
        workers_spawned: 0,
        completed_tasks: 0,
        shutting_down: false,
        shutdown_reply: None,
        shutdown_graceful: true,
        shutdown_deadline: None,
        shutdown_workers_notified: false,
        config,
    };

    for _ in 0..ctx.config.pool_size {
        ctx.spawn_worker().await?;
    }

    events.publish(PoolEvent::PoolInitialized {
        worker_count: ctx.workers.len(),
        at: Utc::now(),
    });

    tokio::spawn(ctx.run(submit_rx, control_rx, worker_events_rx));
    Ok(())
}

impl DispatchContext {
    async fn run(
        mut self,
        mut submit_rx: mpsc::Receiver<SubmitCommand>,
        mut control_rx: mpsc::Receiver<ControlCommand>,
        mut worker_events_rx: mpsc::Receiver<(WorkerId, WorkerEvent)>,
    ) {
        let mut maintenance_ticker = tokio::time::interval(MAINTENANCE_TICK);
        let mut health_ticker = tokio::time::interval(self.config.health_check_interval_ms);
        let mut scale_ticker = tokio::time::interval(self.config.scale_interval_ms);

        let mut control_closed = false;
        let mut submit_closed = false;

        loop {
            tokio::select! {
                command = control_rx.recv(), if !control_closed => {
                    match command {
                        Some(command) => self.handle_control(command).await,
                        None => {
                            control_closed = true;
                            if !self.shutting_down {
                                self.force_shutdown();
                            }
                        }
                    }
                }

                command = submit_rx.recv(), if !submit_closed && !self.shutting_down => {
                    match command {
                        Some(command) => self.handle_submit(command),
                        None => submit_closed = true,
                    }
                }

                event = worker_events_rx.recv() => {
                    match event {
                        Some((worker_id, event)) => self.handle_worker_event(worker_id, event).await,
                        None => {} // every WorkerHandle keeps its own sender alive; only drops with the context itself
                    }
                }

                _ = maintenance_ticker.tick() => self.run_maintenance().await,

                _ = health_ticker.tick() => self.run_health_scan().await,

                _ = scale_ticker.tick() => self.run_scale_eval().await,
            }

            self.dispatch_ready_tasks().await;

            if self.shutting_down && !self.shutdown_workers_notified {
                let stats = self.queue.stats();
                let drained = stats.depth == 0 && stats.retry_pending == 0;
                let overdue = self.shutdown_deadline.is_some_and(|d| Utc::now() >= d);
                if drained {
                    self.notify_workers_to_shutdown(self.shutdown_graceful);
                } else if overdue {
                    // Out of grace time with work still queued: cut losses
                    // and force every worker down rather than wait forever.
                    self.notify_workers_to_shutdown(false);
                }
            }

            if self.shutting_down && self.drain_complete() {
                self.finish_shutdown().await;
                break;
            }
        }
    }

    /// Treat the pool handle being dropped without an explicit `Shutdown`
    /// call as an immediate, non-graceful shutdown.
    fn force_shutdown(&mut self) {
        self.shutting_down = true;
        self.shutdown_graceful = false;
        self.shutdown_deadline = Some(Utc::now());
        self.notify_workers_to_shutdown(false);
    }

    /// Send `Shutdown` to every currently-running worker. Idempotent: a
    /// graceful shutdown defers this call until the queue has drained or the
    /// grace deadline passes (see `begin_shutdown` and the drain check in
    /// `run`), so this must never fire twice for the same shutdown.
    fn notify_workers_to_shutdown(&mut self, graceful: bool) {
        if self.shutdown_workers_notified {
            return;
        }
        self.shutdown_workers_notified = true;
        let worker_ids: Vec<WorkerId> = self.workers.keys().copied().collect();
        for id in worker_ids {
            if let Some(entry) = self.workers.get(&id) {
                let outbox = entry.handle.outbox.clone();
                tokio::spawn(async move {
                    let _ = outbox.send(ParentMessage::Shutdown { graceful }).await;
                });
            }
        }
    }

    async fn spawn_worker(&mut self) -> Result<WorkerId, PoolError> {
        let id = WorkerId::new();
        let heartbeat_ms = self.config.heartbeat_interval_ms.as_millis() as u64;
        let handle = WorkerHandle::spawn(
            id,
            heartbeat_ms,
            self.config.worker_memory_threshold_mb,
            self.worker_events_tx.clone(),
            self.config.worker_exe_override.as_deref(),
        )
        .map_err(|e| PoolError::WorkerStartFailed { reason: e.to_string() })?;
        let info = WorkerInfo::new(id, handle.pid);
        self.workers.insert(id, WorkerEntry { handle, info });
        self.workers_spawned += 1;
        self.events.publish(PoolEvent::WorkerStarted { worker_id: id, at: Utc::now() });
        Ok(id)
    }

    fn handle_submit(&mut self, command: SubmitCommand) {
        let task_id = command.task.id;
        self.pending_replies.insert(task_id, command.reply);
        if let Some(token) = command.cancellation {
            self.cancellations.insert(task_id, token);
        }
        self.queue.enqueue(command.task);
        self.events.publish(PoolEvent::TaskSubmitted { task_id, at: Utc::now() });
    }

    /// Resolve every still-queued task whose cancellation token has fired.
    /// Dispatched tasks are left alone: `cancellations` only ever holds
    /// entries for tasks `remove_queued` can still find in the heap.
    fn process_cancellations(&mut self) {
        if self.cancellations.is_empty() {
            return;
        }
        let fired: Vec<TaskId> = self
            .cancellations
            .iter()
            .filter(|(_, token)| token.is_cancelled())
            .map(|(id, _)| *id)
            .collect();
        for task_id in fired {
            self.cancellations.remove(&task_id);
            if self.queue.remove_queued(task_id) {
                if let Some(reply) = self.pending_replies.remove(&task_id) {
                    let _ = reply.send(Err(TaskError {
                        task_id,
                        attempts: 0,
                        last_kind: TaskErrorKind::Cancelled,
                        last_message: "task cancelled before dispatch".into(),
                        history: Vec::new(),
                    }));
                }
                self.events.publish(PoolEvent::TaskCancelled { task_id, at: Utc::now() });
            }
        }
    }

    async fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::ScaleUp { by, reply } => {
                let result = self.scale_up(by).await;
                let _ = reply.send(result);
            }
            ControlCommand::ScaleDown { by, reply } => {
                let result = self.scale_down(by).await;
                let _ = reply.send(result);
            }
            ControlCommand::Shutdown { graceful, reply } => {
                self.begin_shutdown(graceful, reply);
            }
            ControlCommand::WorkerStatus { id, reply } => {
                let _ = reply.send(self.workers.get(&id).map(|w| w.info.clone()));
            }
            ControlCommand::AllWorkers { reply } => {
                let _ = reply.send(self.workers.values().map(|w| w.info.clone()).collect());
            }
            ControlCommand::Metrics { reply } => {
                let _ = reply.send(self.current_metrics());
            }
            ControlCommand::Subscribe { reply } => {
                let _ = reply.send(self.events.subscribe());
            }
        }
    }

    async fn scale_up(&mut self, by: usize) -> Result<(), PoolError> {
        let target = self.workers.len() + by;
        if target > self.config.max_workers {
            return Err(PoolError::ScaleOutOfBounds {
                requested: target,
                min: self.config.min_workers,
                max: self.config.max_workers,
            });
        }
        for _ in 0..by {
            self.spawn_worker().await?;
        }
        self.events.publish(PoolEvent::PoolScaled { workers: self.workers.len(), at: Utc::now() });
        Ok(())
    }

    async fn scale_down(&mut self, by: usize) -> Result<(), PoolError> {
        if self.workers.len().saturating_sub(by) < self.config.min_workers {
            return Err(PoolError::ScaleOutOfBounds {
                requested: self.workers.len().saturating_sub(by),
                min: self.config.min_workers,
                max: self.config.max_workers,
            });
        }
        let idle_ids: Vec<WorkerId> = self
            .workers
            .values()
            .filter(|w| w.info.is_ready() && w.info.current_task_id.is_none())
            .map(|w| w.info.id)
            .take(by)
            .collect();
        for id in idle_ids {
            self.retire_worker(id).await;
        }
        self.events.publish(PoolEvent::PoolScaled { workers: self.workers.len(), at: Utc::now() });
        Ok(())
    }

    async fn retire_worker(&mut self, id: WorkerId) {
        if let Some(mut entry) = self.workers.remove(&id) {
            let _ = entry.handle.outbox.send(ParentMessage::Shutdown { graceful: true }).await;
            self.events.publish(PoolEvent::WorkerExited { worker_id: id, at: Utc::now() });
        }
    }

    fn begin_shutdown(&mut self, graceful: bool, reply: oneshot::Sender<Result<(), PoolError>>) {
        self.shutting_down = true;
        self.shutdown_graceful = graceful;
        self.shutdown_reply = Some(reply);
        self.shutdown_deadline = Some(Utc::now() + chrono::Duration::from_std(self.config.shutdown_grace_ms).unwrap_or_default());

        // A graceful shutdown must let every already-queued task run to
        // completion (spec §8 scenario 6), not just the tasks in flight at
        // the moment `Shutdown` is called. So workers are only told to
        // shut down once the queue has drained (checked in `run`) or the
        // grace deadline passes — not here. A non-graceful shutdown has no
        // such obligation and notifies immediately.
        if !graceful {
            self.notify_workers_to_shutdown(false);
        }
    }

    fn drain_complete(&self) -> bool {
        if !self.shutting_down {
            return false;
        }
        let overdue = self.shutdown_deadline.is_some_and(|d| Utc::now() >= d);
        self.workers.is_empty() || overdue
    }

    async fn finish_shutdown(&mut self) {
        for (_, mut entry) in self.workers.drain() {
            let _ = entry.handle.kill().await;
        }
        self.events.publish(PoolEvent::PoolShutDown { at: Utc::now() });
        if let Some(reply) = self.shutdown_reply.take() {
            let result = if self.shutdown_graceful && self.shutdown_deadline.is_some_and(|d| Utc::now() >= d) {
                Err(PoolError::ShutdownTimedOut { grace: self.config.shutdown_grace_ms })
            } else {
                Ok(())
            };
            let _ = reply.send(result);
        }
        for (_, reply) in self.pending_replies.drain() {
            let _ = reply.send(Err(TaskError {
                task_id: TaskId::new(),
                attempts: 0,
                last_kind: TaskErrorKind::WorkerCrashed,
                last_message: "pool shut down".into(),
                history: Vec::new(),
            }));
        }
    }

    async fn handle_worker_event(&mut self, worker_id: WorkerId, event: WorkerEvent) {
        match event {
            WorkerEvent::Message(message) => self.handle_child_message(worker_id, message).await,
            WorkerEvent::Disconnected => self.handle_worker_crash(worker_id).await,
        }
    }

    async fn handle_child_message(&mut self, worker_id: WorkerId, message: ChildMessage) {
        match message {
            ChildMessage::WorkerReady => {
                if let Some(entry) = self.workers.get_mut(&worker_id) {
                    entry.info.state = WorkerState::Ready;
                    entry.info.last_heartbeat_at = Some(Utc::now());
                }
            }
            ChildMessage::Heartbeat {
                state,
                tasks_executed,
                memory_bytes,
                current_task_id,
                ..
            } => {
                if let Some(entry) = self.workers.get_mut(&worker_id) {
                    entry.info.state = state;
                    entry.info.last_heartbeat_at = Some(Utc::now());
                    entry.info.tasks_executed = tasks_executed;
                    entry.info.memory_bytes = memory_bytes;
                    entry.info.current_task_id = current_task_id;
                }
            }
            ChildMessage::TaskComplete { task_id, result, .. } => {
                self.queue.complete_task(task_id);
                self.release_worker(worker_id);
                self.completed_tasks += 1;
                self.events.publish(PoolEvent::TaskCompleted { task_id, at: Utc::now() });
                if let Some(reply) = self.pending_replies.remove(&task_id) {
                    let _ = reply.send(Ok(result));
                }
            }
            ChildMessage::TaskFailed { task_id, error, .. } => {
                self.release_worker(worker_id);
                self.finish_failed_task(task_id, TaskErrorKind::from_wire_str(&error.kind), error.message);
            }
            ChildMessage::HighMemoryWarning { bytes } => {
                if let Some(entry) = self.workers.get_mut(&worker_id) {
                    entry.info.memory_bytes = bytes;
                }
            }
            ChildMessage::WorkerError { error, fatal } => {
                warn!(worker_id = %worker_id, error, fatal, "worker reported an error");
                if fatal {
                    self.handle_worker_crash(worker_id).await;
                }
            }
            ChildMessage::WorkerShutdown { .. } => {
                self.workers.remove(&worker_id);
                self.events.publish(PoolEvent::WorkerExited { worker_id, at: Utc::now() });
            }
            ChildMessage::WorkerLog { message, .. } => {
                self.events.publish(PoolEvent::WorkerLog {
                    worker_id,
                    message: Value::String(message),
                    at: Utc::now(),
                });
            }
        }
    }

    fn release_worker(&mut self, worker_id: WorkerId) {
        if let Some(entry) = self.workers.get_mut(&worker_id) {
            entry.info.state = WorkerState::Ready;
            entry.info.current_task_id = None;
        }
    }

    fn finish_failed_task(&mut self, task_id: TaskId, kind: TaskErrorKind, message: String) {
        match self.queue.fail_task(task_id, kind, message) {
            FailOutcome::Retried { .. } => {
                self.events.publish(PoolEvent::TaskFailed { task_id, retry_scheduled: true, at: Utc::now() });
            }
            FailOutcome::DeadLettered => {
                self.events.publish(PoolEvent::TaskDeadLettered { task_id, at: Utc::now() });
                if let Some(task) = self.queue.dead_letter_queue().iter().rev().find(|t| t.id == task_id) {
                    let last = task.attempts.last();
                    let task_error = TaskError {
                        task_id,
                        attempts: task.attempts.len() as u32,
                        last_kind: last.map(|a| a.kind).unwrap_or(kind),
                        last_message: last.map(|a| a.message.clone()).unwrap_or_default(),
                        history: task.attempts.clone(),
                    };
                    if let Some(reply) = self.pending_replies.remove(&task_id) {
                        let _ = reply.send(Err(task_error));
                    }
                }
            }
            FailOutcome::Unknown => {}
        }
    }

    async fn handle_worker_crash(&mut self, worker_id: WorkerId) {
        let current_task_id = self.workers.get(&worker_id).and_then(|w| w.info.current_task_id);
        if let Some(task_id) = current_task_id {
            self.finish_failed_task(task_id, TaskErrorKind::WorkerCrashed, "worker process exited".into());
        }
        self.workers.remove(&worker_id);
        self.events.publish(PoolEvent::WorkerExited { worker_id, at: Utc::now() });

        if self.shutting_down {
            return;
        }
        let (action, raised) = self.health.record_crash(worker_id, Utc::now());
        for alert in raised {
            self.events.publish(PoolEvent::HealthAlert { alert, at: Utc::now() });
        }
        if action.is_some() {
            self.total_restarts += 1;
            if let Ok(new_id) = self.spawn_worker().await {
                self.events.publish(PoolEvent::WorkerRestarted {
                    worker_id: new_id,
                    reason: "process crashed".into(),
                    at: Utc::now(),
                });
            }
        }
    }

    async fn run_maintenance(&mut self) {
        let now = Utc::now();
        self.process_cancellations();
        let due = self.queue.process_due_retries(now);
        if !due.is_empty() {
            info!(count = due.len(), "re-enqueued tasks after backoff");
        }

        let mut timed_out_workers: Vec<WorkerId> = Vec::new();
        for task_id in self.queue.check_timeouts(now) {
            if let Some(worker_id) = self.workers.iter().find_map(|(id, w)| {
                (w.info.current_task_id == Some(task_id)).then_some(*id)
            }) {
                timed_out_workers.push(worker_id);
            }
            self.finish_failed_task(task_id, TaskErrorKind::TaskTimeout, "task exceeded its timeout".into());
        }

        // The worker protocol has no cooperative cancellation (spec §5): a
        // worker mid-handler when its task times out is still genuinely
        // busy, not ready for new work. Reclaiming it means killing and
        // replacing it, the same as any other crashed worker, rather than
        // optimistically marking it `ready` while it secretly keeps running.
        for worker_id in timed_out_workers {
            if let Some(mut entry) = self.workers.remove(&worker_id) {
                let _ = entry.handle.kill().await;
                self.events.publish(PoolEvent::WorkerExited { worker_id, at: Utc::now() });
                self.total_restarts += 1;
                if let Ok(new_id) = self.spawn_worker().await {
                    self.events.publish(PoolEvent::WorkerRestarted {
                        worker_id: new_id,
                        reason: "task exceeded its timeout".into(),
                        at: Utc::now(),
                    });
                }
            }
        }

        self.queue.evict_expired(now);
    }

    async fn run_health_scan(&mut self) {
        let snapshot: Vec<WorkerInfo> = self.workers.values().map(|w| w.info.clone()).collect();
        let (actions, raised) = self.health.scan(&snapshot, Utc::now());
        for alert in raised {
            self.events.publish(PoolEvent::HealthAlert { alert, at: Utc::now() });
        }
        for action in actions {
            if let Some(mut entry) = self.workers.remove(&action.worker_id) {
                let _ = entry.handle.kill().await;
                if let Some(task_id) = entry.info.current_task_id {
                    self.finish_failed_task(task_id, TaskErrorKind::WorkerCrashed, "worker restarted by health monitor".into());
                }
            }
            self.total_restarts += 1;
            if let Ok(new_id) = self.spawn_worker().await {
                self.events.publish(PoolEvent::WorkerRestarted {
                    worker_id: new_id,
                    reason: "failed health check".into(),
                    at: Utc::now(),
                });
            }
        }
    }

    async fn run_scale_eval(&mut self) {
        if !self.scaler.is_enabled() || self.shutting_down {
            return;
        }
        let stats = self.queue.stats();
        let busy = self.workers.values().filter(|w| w.info.state == WorkerState::Busy).count();
        let total = self.workers.len();
        match self.scaler.evaluate(stats.depth, busy, total, Utc::now()) {
            ScaleDecision::ScaleUp { by } => {
                let _ = self.scale_up(by).await;
            }
            ScaleDecision::ScaleDown { by } => {
                let _ = self.scale_down(by).await;
            }
            ScaleDecision::Hold => {}
        }
    }

    async fn dispatch_ready_tasks(&mut self) {
        // Once workers have actually been told to shut down there's no
        // point handing them more work; they'll reject it. Until then — in
        // particular during a graceful shutdown's drain window — queued
        // tasks keep flowing to idle workers.
        if self.shutdown_workers_notified {
            return;
        }
        loop {
            let candidates: Vec<Candidate> = self
                .workers
                .values()
                .filter(|w| w.info.is_ready() && w.info.current_task_id.is_none())
                .map(|w| Candidate { id: w.info.id, in_flight: w.info.tasks_executed as usize })
                .collect();
            if candidates.is_empty() {
                return;
            }
            let Some(worker_id) = self.balancer.select(&candidates) else {
                return;
            };

            let task = match self.queue.peek() {
                Some(task) if self.task_fits(task, worker_id) => match self.queue.dequeue() {
                    DequeueOutcome::Task(task) => task,
                    DequeueOutcome::Empty => return,
                },
                _ => return,
            };

            let task_id = task.id;
            self.cancellations.remove(&task_id);
            if let Some(entry) = self.workers.get_mut(&worker_id) {
                entry.info.state = WorkerState::Busy;
                entry.info.current_task_id = Some(task_id);
                if entry.handle.outbox.send(ParentMessage::ExecuteTask { task }).await.is_err() {
                    self.release_worker(worker_id);
                    self.finish_failed_task(task_id, TaskErrorKind::WorkerCrashed, "worker channel closed".into());
                    continue;
                }
            }
            self.events.publish(PoolEvent::TaskDispatched { task_id, worker_id, at: Utc::now() });
        }
    }

    /// Currently every ready worker can run every task type; this hook
    /// exists so a future handler-affinity requirement has one place to
    /// plug into.
    fn task_fits(&self, _task: &Task, _worker_id: WorkerId) -> bool {
        true
    }

    fn current_metrics(&self) -> PoolMetrics {
        let stats = self.queue.stats();
        let ready = self.workers.values().filter(|w| w.info.is_ready()).count();
        let busy = self.workers.values().filter(|w| w.info.state == WorkerState::Busy).count();
        PoolMetrics::from_queue_stats(
            &stats,
            self.workers.len(),
            ready,
            busy,
            self.total_restarts,
            self.workers_spawned,
            self.completed_tasks,
        )
    }
}
