//! Device-command kernel.
//!
//! Model output flows through here: reinforcement, tag parsing, then the
//! execution engine which dedupes, applies the capacity interlock, calls the
//! device capability and arms the timers that turn devices back off.

pub mod directive;
pub mod engine;
pub mod event;
pub mod parser;
pub mod patterns;
pub mod reinforcer;
pub mod session;
pub mod timers;

pub use directive::{Action, CommandResult, DeviceKind, DeviceRecord, Directive};
pub use engine::{ExecuteOptions, ExecutionEngine, ProcessedResponse};
pub use event::Notification;
pub use session::SessionState;
