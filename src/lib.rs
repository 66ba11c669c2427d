//! # Web Task Queue
//!
//! Deferred task execution for a web endpoint, using Redis as the broker
//! between the serving process and an independent worker pool.
//!
//! ## How it fits together
//!
//! - The `web` binary serves one GET endpoint. The handler enqueues a task
//!   and responds immediately with its request/response timestamps; it
//!   never waits for the task.
//! - The `worker` binary polls the broker, claims task messages and runs
//!   the registered handler (sleep for a configured duration, then write a
//!   two-line timestamp report).
//! - Both processes are built from the same [`config::Settings`]; Redis is
//!   their only communication channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use web_task_queue::{Settings, TaskClient, tasks::SleepReport};
//!
//! # async fn demo() -> web_task_queue::TaskResult<()> {
//! let settings = Settings::from_env()?;
//! let client = TaskClient::connect(&settings).await?;
//!
//! // Fire-and-forget: returns a task id, never the result.
//! let task_id = client.delay(&SleepReport).await?;
//! println!("enqueued {task_id}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod queue;
pub mod server;
pub mod task;
pub mod tasks;
pub mod worker;

// Re-export commonly used types
pub use client::TaskClient;
pub use config::Settings;
pub use error::{TaskError, TaskResult};
pub use queue::BrokerQueue;
pub use task::{Task, TaskEnvelope, TaskId, TaskStatus};
pub use worker::{Worker, WorkerConfig};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
