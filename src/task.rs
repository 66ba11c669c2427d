//! Task messages and the producer-side task contract

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JSON_CONTENT_TYPE;
use crate::error::TaskResult;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// Task execution status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is waiting on the broker
    Pending,
    /// Task is currently being executed by a worker
    Running,
    /// Task completed successfully
    Success,
    /// Task failed with an error
    Failed,
}

impl TaskStatus {
    /// Whether the task has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

/// Producer-side declaration of an enqueueable unit of work.
///
/// A task is nothing more than a stable routing name plus a serializable
/// payload. Execution lives entirely on the worker side (see
/// [`crate::worker::TaskHandler`]); producer and worker share only the name
/// and the wire payload, since the broker is their sole communication
/// channel.
pub trait Task: Serialize {
    /// Stable name used to route the message to a worker-side handler
    fn name(&self) -> &'static str;
}

/// The serialized task message handed to the broker.
///
/// Created when the producer enqueues, owned by the broker until a worker
/// claims it, and written to the result backend once the worker reaches a
/// terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Unique task identifier
    pub id: TaskId,
    /// Task routing name
    pub name: String,
    /// Serialized task payload
    pub payload: String,
    /// Content type of the payload
    pub content_type: String,
    /// Current task status
    pub status: TaskStatus,
    /// When the task was enqueued
    pub created_at: DateTime<Utc>,
    /// When a worker started executing the task
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Queue the task was routed through
    pub queue: String,
    /// Worker that claimed the task
    pub worker_id: Option<String>,
    /// Serialized execution result (on success)
    pub result: Option<String>,
    /// Error message (on failure)
    pub error: Option<String>,
}

impl TaskEnvelope {
    /// Wrap a task into a fresh envelope bound for the given queue
    pub fn new<T>(task: &T, queue: String) -> TaskResult<Self>
    where
        T: Task,
    {
        Ok(Self {
            id: TaskId::new_v4(),
            name: task.name().to_string(),
            payload: serde_json::to_string(task)?,
            content_type: JSON_CONTENT_TYPE.to_string(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            queue,
            worker_id: None,
            result: None,
            error: None,
        })
    }

    /// Mark the task as claimed and running on a worker
    pub fn mark_started(&mut self, worker_id: String) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.worker_id = Some(worker_id);
    }

    /// Mark the task as completed, storing the serialized result
    pub fn mark_success(&mut self, result: String) {
        self.status = TaskStatus::Success;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    /// Mark the task as failed
    pub fn mark_failed(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.to_string());
    }

    /// Get task execution duration if available
    pub fn execution_duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some(finished - started),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct NoopTask;

    impl Task for NoopTask {
        fn name(&self) -> &'static str {
            "noop"
        }
    }

    #[test]
    fn fresh_envelope_is_pending() {
        let envelope = TaskEnvelope::new(&NoopTask, "default".to_string()).unwrap();
        assert_eq!(envelope.status, TaskStatus::Pending);
        assert_eq!(envelope.name, "noop");
        assert_eq!(envelope.content_type, "application/json");
        assert!(envelope.started_at.is_none());
        assert!(envelope.execution_duration().is_none());
        assert!(!envelope.status.is_terminal());
    }

    #[test]
    fn success_lifecycle_orders_timestamps() {
        let mut envelope = TaskEnvelope::new(&NoopTask, "default".to_string()).unwrap();
        envelope.mark_started("worker-1".to_string());
        assert_eq!(envelope.status, TaskStatus::Running);

        envelope.mark_success("null".to_string());
        assert_eq!(envelope.status, TaskStatus::Success);
        assert!(envelope.status.is_terminal());
        assert_eq!(envelope.worker_id.as_deref(), Some("worker-1"));

        let started = envelope.started_at.unwrap();
        let finished = envelope.finished_at.unwrap();
        assert!(finished >= started);
        assert!(envelope.execution_duration().unwrap() >= chrono::Duration::zero());
    }

    #[test]
    fn failure_records_error() {
        let mut envelope = TaskEnvelope::new(&NoopTask, "default".to_string()).unwrap();
        envelope.mark_started("worker-1".to_string());
        envelope.mark_failed("boom");
        assert_eq!(envelope.status, TaskStatus::Failed);
        assert_eq!(envelope.error.as_deref(), Some("boom"));
        assert!(envelope.result.is_none());
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = TaskEnvelope::new(&NoopTask, "reports".to_string()).unwrap();
        let json = serde_json::to_string(&envelope).unwrap();
        let decoded: TaskEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.id, envelope.id);
        assert_eq!(decoded.queue, "reports");
        assert_eq!(decoded.status, TaskStatus::Pending);
    }
}
