//! Small shared utilities: identifiers and a `chrono::Duration` <-> millis serde helper.

pub mod duration_ms;
pub mod ids;

pub use ids::{AlertId, TaskId, WorkerId};
