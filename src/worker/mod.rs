//! Worker process lifecycle: the supervisor-side handle, the child-side
//! runtime it talks to, and the shared data model (spec §3 "Worker", §4.5).

pub mod handle;
pub mod runtime;
pub mod types;

pub use handle::{WorkerEvent, WorkerHandle, WorkerSpawnError};
pub use runtime::{maybe_enter_worker_mode, HandlerRegistry, TaskHandler, WorkerRuntimeError};
pub use types::{WorkerInfo, WorkerState};
