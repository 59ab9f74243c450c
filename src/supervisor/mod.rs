//! The pool supervisor: a single-writer dispatch context behind a cheap,
//! cloneable handle (spec §4.6).

mod dispatch;
mod pool;

pub use pool::{Pool, Submission};
