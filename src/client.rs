//! Producer-side facade for enqueueing tasks

use std::sync::Arc;

use crate::config::Settings;
use crate::error::TaskResult;
use crate::queue::BrokerQueue;
use crate::task::{Task, TaskEnvelope, TaskId};

/// Client for handing tasks to the broker.
///
/// `delay` is the entire producer contract: it returns once the broker has
/// the message, with a task-handle identifier and never a result. Nothing
/// here waits for execution.
#[derive(Debug)]
pub struct TaskClient {
    queue: Arc<BrokerQueue>,
}

impl TaskClient {
    /// Connect a client using the shared settings
    pub async fn connect(settings: &Settings) -> TaskResult<Self> {
        let queue = Arc::new(BrokerQueue::connect(settings).await?);
        Ok(Self { queue })
    }

    /// Create a client from an existing broker connection
    pub fn from_queue(queue: Arc<BrokerQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue a task on the default queue, returning its id immediately
    pub async fn delay<T>(&self, task: &T) -> TaskResult<TaskId>
    where
        T: Task,
    {
        let queue_name = self.queue.default_queue().to_string();
        self.delay_to(task, &queue_name).await
    }

    /// Enqueue a task on a specific queue
    pub async fn delay_to<T>(&self, task: &T, queue_name: &str) -> TaskResult<TaskId>
    where
        T: Task,
    {
        let envelope = TaskEnvelope::new(task, queue_name.to_string())?;
        self.queue.enqueue(envelope).await
    }

    /// Read a task's current envelope from the result backend.
    ///
    /// The HTTP handler never calls this; it exists for operators and tests
    /// that do want to observe an outcome.
    pub async fn fetch_status(&self, task_id: TaskId) -> TaskResult<Option<TaskEnvelope>> {
        self.queue.fetch(task_id).await
    }

    /// Access the underlying broker connection
    pub fn queue(&self) -> &Arc<BrokerQueue> {
        &self.queue
    }
}
