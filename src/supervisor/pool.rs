//! The public pool handle: `Submit`, `Shutdown`, scaling, and introspection
//! (spec §4.6, §6).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::config::PoolConfig;
use crate::error::{PoolError, TaskError};
use crate::events::PoolEvent;
use crate::metrics::PoolMetrics;
use crate::supervisor::dispatch::{run_dispatch_loop, ControlCommand, SubmitCommand};
use crate::task::{CancellationToken, Task, DEFAULT_PRIORITY};
use crate::util::{TaskId, WorkerId};
use crate::worker::WorkerInfo;

/// A future resolving to a task's final outcome. Also exposes the task's
/// id immediately, before completion, for correlating with events.
pub struct Submission {
    task_id: TaskId,
    completion: oneshot::Receiver<Result<Value, TaskError>>,
}

impl Submission {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl Future for Submission {
    type Output = Result<Value, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.completion).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError {
                task_id: self.task_id,
                attempts: 0,
                last_kind: crate::error::TaskErrorKind::WorkerCrashed,
                last_message: "pool shut down before task completed".into(),
                history: Vec::new(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to a running worker pool. Cheap to clone; every clone shares the
/// same dispatch context task.
#[derive(Clone)]
pub struct Pool {
    config: PoolConfig,
    submit_tx: mpsc::Sender<SubmitCommand>,
    control_tx: mpsc::Sender<ControlCommand>,
}

impl Pool {
    /// Validate `config`, spawn the initial workers, and start the dispatch
    /// context as a background task.
    pub async fn start(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        // `submit_tx` capacity equals `max_queue_depth`: a `Block`-policy
        // submit simply awaits a permit, which is the queue back-pressure
        // the spec calls for without any extra bookkeeping.
        let (submit_tx, submit_rx) = mpsc::channel(config.max_queue_depth);
        let (control_tx, control_rx) = mpsc::channel(256);

        let pool = Self {
            config: config.clone(),
            submit_tx,
            control_tx,
        };

        run_dispatch_loop(config, submit_rx, control_rx).await?;

        Ok(pool)
    }

    /// Submit a task and get back a future for its eventual result.
    ///
    /// Honors `submit_on_overflow`: `Block` suspends until queue capacity
    /// frees up; `Reject` returns `PoolError::QueueFull` immediately.
    ///
    /// `cancellation`, if given, lets the caller cancel the task later by
    /// calling [`CancellationToken::cancel`] — but only up until dispatch;
    /// the worker protocol has no way to interrupt a task already running
    /// (spec §5). A token that has already fired is rejected immediately
    /// with `PoolError::Cancelled` rather than silently enqueued.
    pub async fn submit(&self, task: Task, cancellation: Option<CancellationToken>) -> Result<Submission, PoolError> {
        let task_id = task.id;
        if let Some(token) = &cancellation {
            if token.is_cancelled() {
                return Err(PoolError::Cancelled { task_id });
            }
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = SubmitCommand {
            task,
            reply: reply_tx,
            cancellation,
        };

        match self.config.submit_on_overflow {
            crate::config::OverflowPolicy::Block => {
                self.submit_tx.send(command).await.map_err(|_| PoolError::ShutDown)?;
            }
            crate::config::OverflowPolicy::Reject => {
                self.submit_tx.try_send(command).map_err(|err| match err {
                    mpsc::error::TrySendError::Full(_) => PoolError::QueueFull {
                        max_queue_depth: self.config.max_queue_depth,
                    },
                    mpsc::error::TrySendError::Closed(_) => PoolError::ShutDown,
                })?;
            }
        }

        Ok(Submission {
            task_id,
            completion: reply_rx,
        })
    }

    /// `Submit(type, payload, priority?, timeout?, cancellation?)` from the
    /// public API (spec §6): build a [`Task`] from its type and payload,
    /// filling in any of `priority`/`timeout`/`max_retries` left `None` from
    /// this pool's configured defaults (`task_timeout_ms`,
    /// `max_task_retries`), then submit it with the given cancellation
    /// token, if any.
    ///
    /// Use [`Pool::submit`] directly when the caller already has a fully
    /// formed `Task`, e.g. one round-tripped from storage.
    pub async fn submit_task(
        &self,
        task_type: impl Into<String>,
        payload: Value,
        priority: Option<i32>,
        timeout: Option<Duration>,
        max_retries: Option<u32>,
        cancellation: Option<CancellationToken>,
    ) -> Result<Submission, PoolError> {
        let task = Task::new(
            task_type.into(),
            payload,
            priority.unwrap_or(DEFAULT_PRIORITY),
            timeout.unwrap_or(self.config.task_timeout_ms),
        )
        .with_max_retries(max_retries.unwrap_or(self.config.max_task_retries));

        self.submit(task, cancellation).await
    }

    pub async fn scale_up(&self, by: usize) -> Result<(), PoolError> {
        self.control_request(|reply| ControlCommand::ScaleUp { by, reply }).await
    }

    pub async fn scale_down(&self, by: usize) -> Result<(), PoolError> {
        self.control_request(|reply| ControlCommand::ScaleDown { by, reply }).await
    }

    /// Begin shutdown. If `graceful`, in-flight tasks are allowed to drain
    /// (bounded by `shutdown_grace_ms`) before workers are killed.
    pub async fn shutdown(&self, graceful: bool) -> Result<(), PoolError> {
        self.control_request(|reply| ControlCommand::Shutdown { graceful, reply }).await
    }

    pub async fn worker_status(&self, id: WorkerId) -> Option<WorkerInfo> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlCommand::WorkerStatus { id, reply: reply_tx })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    pub async fn all_workers(&self) -> Vec<WorkerInfo> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlCommand::AllWorkers { reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub async fn metrics(&self) -> Option<PoolMetrics> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlCommand::Metrics { reply: reply_tx })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.ok()
    }

    /// Subscribe to pool lifecycle events. The returned receiver has its
    /// own bounded buffer; a slow subscriber only ever falls behind its own
    /// channel (spec §9).
    pub async fn subscribe(&self) -> Option<mpsc::Receiver<PoolEvent>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlCommand::Subscribe { reply: reply_tx })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.ok()
    }

    async fn control_request<F>(&self, build: F) -> Result<(), PoolError>
    where
        F: FnOnce(oneshot::Sender<Result<(), PoolError>>) -> ControlCommand,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| PoolError::ShutDown)?;
        reply_rx.await.map_err(|_| PoolError::ShutDown)?
    }
}
