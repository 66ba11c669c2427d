//! Error types shared by the producer, broker client and worker

use thiserror::Error;

/// Result type alias for task operations
pub type TaskResult<T> = Result<T, TaskError>;

/// Error taxonomy for the deferred-execution pipeline
#[derive(Error, Debug)]
pub enum TaskError {
    /// Redis connection or command errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Task message serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker operation errors
    #[error("Queue operation failed: {operation}: {reason}")]
    QueueOperation { operation: String, reason: String },

    /// Task execution errors reported by a handler
    #[error("Task execution failed: {message}")]
    TaskExecution { message: String },

    /// No handler registered for a claimed task name
    #[error("No handler registered for task: {task_name}")]
    HandlerNotFound { task_name: String },

    /// Task not found in the result backend
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// Configuration errors (rejected at startup)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// IO errors (report file writes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors for wrapping other error types
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TaskError {
    /// Create a queue operation error
    pub fn queue_operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueueOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a task execution error
    pub fn task_execution<S: Into<String>>(message: S) -> Self {
        Self::TaskExecution {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}
