//! Task data model and the priority queue that schedules tasks onto workers.

pub mod cancellation;
pub mod queue;
pub mod types;

pub use cancellation::CancellationToken;
pub use queue::{DequeueOutcome, FailOutcome, QueueStats, TaskQueue};
pub use types::{Task, TaskStatus, DEFAULT_PRIORITY};
