//! `taskpool`: a persistent worker-pool supervisor.
//!
//! A long-lived [`Pool`] manages a fleet of reusable child processes,
//! dispatching typed tasks over a length-prefixed JSON IPC channel,
//! tracking heartbeats, restarting unhealthy workers and scaling the fleet
//! to the offered load. See the module docs for each piece of the design:
//! [`task`] (the priority queue and dead-letter handling), [`worker`] (the
//! child-side runtime and the supervisor's handle to it), [`health`] (the
//! heartbeat monitor and restart policy), [`balancer`] (task-to-worker
//! selection), [`scaler`] (auto-scaling) and [`supervisor`] (the dispatch
//! context tying all of it together).

pub mod balancer;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod message;
pub mod metrics;
pub mod scaler;
pub mod supervisor;
pub mod task;
pub mod util;
pub mod worker;

pub use config::{OverflowPolicy, PoolConfig, PoolConfigBuilder};
pub use error::{Attempt, PoolError, TaskError, TaskErrorKind};
pub use events::PoolEvent;
pub use metrics::PoolMetrics;
pub use supervisor::{Pool, Submission};
pub use task::{CancellationToken, Task, TaskStatus};
pub use util::{TaskId, WorkerId};
pub use worker::{maybe_enter_worker_mode, HandlerRegistry, TaskHandler, WorkerInfo, WorkerState};
