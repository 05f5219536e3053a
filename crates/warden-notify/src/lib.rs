//! Notification collaborators for workflow events.
//!
//! The core never depends on delivery: sinks are configured purely from
//! the environment, disabled sinks error cleanly, and the dispatcher
//! treats every failure as non-fatal.

pub mod error;
pub mod sink;
pub mod types;

pub use error::NotifyError;
pub use sink::{NotificationDispatcher, NotificationSink, NtfySink, StdoutSink, TelegramSink};
pub use types::{NotificationMessage, NotificationSeverity, NotificationSinkKind};
