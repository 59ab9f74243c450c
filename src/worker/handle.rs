//! Supervisor-side worker process handle (spec §4.5, §9 process model).
//!
//! Workers are spawned by re-executing the current binary with `WORKER_ID`
//! set in its environment; the embedding binary is expected to call
//! [`crate::worker::maybe_enter_worker_mode`] at the top of `main`, which
//! diverts that process into the worker runtime before any supervisor code
//! would otherwise run. This avoids depending on a second compiled artifact
//! for the worker side.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::message::{ChildMessage, IpcChannel, IpcError, ParentMessage};
use crate::util::WorkerId;

/// Failure starting a worker process.
#[derive(Debug, Error)]
pub enum WorkerSpawnError {
    #[error("could not resolve the current executable: {0}")]
    CurrentExe(std::io::Error),
    #[error("failed to spawn worker process: {0}")]
    Spawn(std::io::Error),
    #[error("spawned worker process had no piped stdio")]
    MissingStdio,
}

/// Something the dispatch context's fan-in loop learns about one worker:
/// either a parsed wire message, or the fact that its channel is gone.
#[derive(Debug)]
pub enum WorkerEvent {
    Message(ChildMessage),
    /// The reader hit EOF or a protocol error; the worker must be treated
    /// as crashed regardless of whether `worker-shutdown` was ever seen.
    Disconnected,
}

/// A running worker process and the channels used to talk to it.
///
/// Outbound messages go through `outbox`, fed to a dedicated writer task.
/// Inbound messages are fanned into one shared `events` channel alongside
/// every other worker's, tagged with this worker's id by the dispatch
/// context's caller — see [`spawn`] — so the dispatch loop only ever
/// `select!`s over a single stream no matter how many workers are running.
pub struct WorkerHandle {
    pub id: WorkerId,
    pub pid: u32,
    pub outbox: mpsc::Sender<ParentMessage>,
    child: Child,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Re-exec the current binary (or `exe_override`, if set) as a new
    /// worker process. `events` is the dispatch context's single shared
    /// fan-in channel; every event this worker produces is sent as
    /// `(id, event)`.
    ///
    /// `exe_override` exists for test harnesses whose own binary cannot
    /// double as a worker (it has no `WORKER_ID` dispatch of its own) —
    /// production callers should leave it `None` and let this re-exec
    /// `std::env::current_exe()`.
    pub fn spawn(
        id: WorkerId,
        heartbeat_interval_ms: u64,
        memory_warn_threshold_mb: u64,
        events: mpsc::Sender<(WorkerId, WorkerEvent)>,
        exe_override: Option<&Path>,
    ) -> Result<Self, WorkerSpawnError> {
        let exe = match exe_override {
            Some(path) => path.to_path_buf(),
            None => std::env::current_exe().map_err(WorkerSpawnError::CurrentExe)?,
        };

        let mut child = Command::new(exe)
            .env("WORKER_ID", id.to_string())
            .env("WORKER_HEARTBEAT_INTERVAL_MS", heartbeat_interval_ms.to_string())
            .env("WORKER_MEMORY_WARN_THRESHOLD_MB", memory_warn_threshold_mb.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerSpawnError::Spawn)?;

        let stdin = child.stdin.take().ok_or(WorkerSpawnError::MissingStdio)?;
        let stdout = child.stdout.take().ok_or(WorkerSpawnError::MissingStdio)?;
        let pid = child.id().unwrap_or_default();

        let (outbox_tx, outbox_rx) = mpsc::channel::<ParentMessage>(64);

        let reader_task = tokio::spawn(read_loop(id, stdout, events));
        let writer_task = tokio::spawn(write_loop(id, stdin, outbox_rx));

        Ok(Self {
            id,
            pid,
            outbox: outbox_tx,
            child,
            reader_task,
            writer_task,
        })
    }

    /// Best-effort OS-level kill, for when a worker has stopped responding to
    /// `Shutdown` entirely (health monitor zombie handling, spec §4.3) or is
    /// being forcibly reclaimed after a task timeout. Aborts the reader and
    /// writer tasks once the process is confirmed dead, so a caller that has
    /// already removed this worker from its registry never observes a stray
    /// `Disconnected` event for an id it no longer knows about.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()?;
        let status = self.child.wait().await;
        self.reader_task.abort();
        self.writer_task.abort();
        status?;
        Ok(())
    }

    /// Wait for the process to exit, aborting the reader/writer tasks once it
    /// does.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        let status = self.child.wait().await;
        self.reader_task.abort();
        self.writer_task.abort();
        status
    }
}

async fn read_loop(id: WorkerId, stdout: ChildStdout, events: mpsc::Sender<(WorkerId, WorkerEvent)>) {
    let mut channel = IpcChannel::new(BufReader::new(stdout), tokio::io::sink());
    loop {
        match channel.receive::<ChildMessage>().await {
            Ok(message) => {
                if events.send((id, WorkerEvent::Message(message))).await.is_err() {
                    debug!(worker_id = %id, "dispatch context dropped, stopping reader");
                    return;
                }
            }
            Err(IpcError::Closed) => {
                debug!(worker_id = %id, "worker stdout closed");
                let _ = events.send((id, WorkerEvent::Disconnected)).await;
                return;
            }
            Err(err) => {
                warn!(worker_id = %id, error = %err, "worker protocol error on read");
                let _ = events.send((id, WorkerEvent::Disconnected)).await;
                return;
            }
        }
    }
}

async fn write_loop(id: WorkerId, stdin: ChildStdin, mut outbox: mpsc::Receiver<ParentMessage>) {
    let mut channel = IpcChannel::new(tokio::io::empty(), stdin);
    while let Some(message) = outbox.recv().await {
        if let Err(err) = channel.send(&message).await {
            warn!(worker_id = %id, error = %err, "failed to write to worker stdin");
            return;
        }
    }
}
