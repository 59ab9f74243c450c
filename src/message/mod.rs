//! The supervisor <-> worker wire protocol: tagged-union messages and the
//! length-prefixed framing that carries them.

pub mod framing;
pub mod wire;

pub use framing::{IpcChannel, IpcError};
pub use wire::{ChildMessage, ErrorInfo, ParentMessage, WorkerLogLevel};
