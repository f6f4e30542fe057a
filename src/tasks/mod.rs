//! Background task scheduling.
//!
//! # Data Flow
//! ```text
//! Orchestrator startup
//!     → scheduler.add(Task::new("heartbeat", 30s, job))
//!     → scheduler.start()  (one tokio task per registered Task)
//!     → each Task: tick → run job → tick → ...
//!
//! Orchestrator shutdown
//!     → scheduler.stop()  (signal, then await every task line)
//! ```
//!
//! # Design Decisions
//! - First run happens one interval after start, never immediately
//! - Stop never interrupts a running job body; it waits for it
//! - A stopped scheduler stays stopped
//! - Zero intervals are rejected at registration

pub mod scheduler;

pub use scheduler::{Scheduler, Task, TaskError};
