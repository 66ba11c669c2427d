//! Worker pool that claims and executes task messages

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};
use crate::queue::{BrokerQueue, Claim};
use crate::task::TaskId;

/// Unique identifier for workers
pub type WorkerId = Uuid;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique worker identifier
    pub worker_id: WorkerId,
    /// Queues this worker will poll
    pub queues: Vec<String>,
    /// Maximum number of concurrently executing tasks
    pub max_concurrent_tasks: usize,
    /// Polling interval for new tasks in milliseconds
    pub polling_interval_ms: u64,
    /// Per-task execution timeout in seconds
    pub task_timeout: u64,
    /// Grace period for in-flight tasks on shutdown, in seconds
    pub shutdown_grace_period: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: WorkerId::new_v4(),
            queues: vec!["default".to_string()],
            max_concurrent_tasks: 4,
            polling_interval_ms: 500,
            task_timeout: 300, // 5 minutes
            shutdown_grace_period: 30,
        }
    }
}

/// Counters accumulated over a worker's lifetime
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub tasks_processed: u64,
    pub tasks_successful: u64,
    pub tasks_failed: u64,
    pub average_execution_time_ms: f64,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self {
            tasks_processed: 0,
            tasks_successful: 0,
            tasks_failed: 0,
            average_execution_time_ms: 0.0,
            started_at: chrono::Utc::now(),
        }
    }
}

/// Worker-side executor for a named task type.
///
/// Handlers consume the serialized payload from the task message and return
/// a serialized result; the envelope never crosses this boundary.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    fn can_handle(&self, task_name: &str) -> bool;
    async fn handle(&self, payload: &str) -> TaskResult<String>;
}

/// Registry mapping task names to handlers
#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl TaskHandlerRegistry {
    /// Register a handler under a task name
    pub async fn register<H>(&self, task_name: String, handler: H)
    where
        H: TaskHandler + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(task_name, Arc::new(handler));
    }

    /// Find a handler for a task name
    pub async fn find_handler(&self, task_name: &str) -> Option<Arc<dyn TaskHandler>> {
        let handlers = self.handlers.read().await;

        if let Some(handler) = handlers.get(task_name) {
            return Some(handler.clone());
        }

        // Fall back to handlers that claim the name themselves
        for handler in handlers.values() {
            if handler.can_handle(task_name) {
                return Some(handler.clone());
            }
        }

        None
    }
}

/// Worker that polls the broker and executes claimed tasks.
///
/// Failed executions are acknowledged as Failed and not requeued; retry
/// policy is out of scope for this pipeline.
pub struct Worker {
    config: WorkerConfig,
    queue: Arc<BrokerQueue>,
    handlers: Arc<TaskHandlerRegistry>,
    stats: Arc<Mutex<WorkerStats>>,
    shutdown_signal: Arc<RwLock<bool>>,
    active_tasks: Arc<RwLock<HashMap<TaskId, tokio::task::JoinHandle<()>>>>,
}

impl Worker {
    /// Create a new worker with the given configuration
    pub fn new(config: WorkerConfig, queue: Arc<BrokerQueue>) -> Self {
        Self {
            config,
            queue,
            handlers: Arc::new(TaskHandlerRegistry::default()),
            stats: Arc::new(Mutex::new(WorkerStats::default())),
            shutdown_signal: Arc::new(RwLock::new(false)),
            active_tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a task handler
    pub async fn register_handler<H>(&self, task_name: String, handler: H)
    where
        H: TaskHandler + 'static,
    {
        self.handlers.register(task_name, handler).await;
    }

    /// Run the poll-claim-execute loop until shutdown is signalled
    pub async fn run(&self) -> TaskResult<()> {
        info!(
            "Starting worker {} for queues: {:?}",
            self.config.worker_id, self.config.queues
        );

        for queue_name in &self.config.queues {
            let backlog = self.queue.pending(queue_name).await?;
            if backlog > 0 {
                info!("Queue {} has {} pending tasks", queue_name, backlog);
            }
        }

        let mut poll = interval(Duration::from_millis(self.config.polling_interval_ms));

        loop {
            poll.tick().await;

            if *self.shutdown_signal.read().await {
                break;
            }

            Self::reap_finished(&self.active_tasks).await;

            let active_count = self.active_tasks.read().await.len();
            if active_count >= self.config.max_concurrent_tasks {
                continue;
            }

            for queue_name in &self.config.queues {
                match self.queue.claim_next(queue_name).await {
                    Ok(Some(mut claim)) => {
                        claim
                            .envelope
                            .mark_started(self.config.worker_id.to_string());

                        let task_id = claim.envelope.id;
                        match self.handlers.find_handler(&claim.envelope.name).await {
                            Some(handler) => {
                                let handle = Self::spawn_execution(
                                    claim,
                                    handler,
                                    self.queue.clone(),
                                    self.stats.clone(),
                                    self.config.task_timeout,
                                );
                                self.active_tasks.write().await.insert(task_id, handle);
                            }
                            None => {
                                let err = TaskError::HandlerNotFound {
                                    task_name: claim.envelope.name.clone(),
                                };
                                error!("{err}");
                                claim.envelope.mark_failed(&err.to_string());
                                if let Err(e) = self.queue.fail(&claim).await {
                                    error!("Failed to acknowledge task {task_id}: {e}");
                                }
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Failed to claim from queue {queue_name}: {e}");
                    }
                }
            }
        }

        info!("Worker loop shutting down");
        self.drain().await;

        let stats = self.stats.lock().await.clone();
        info!(
            "Worker {} processed {} tasks ({} ok, {} failed)",
            self.config.worker_id,
            stats.tasks_processed,
            stats.tasks_successful,
            stats.tasks_failed
        );

        Ok(())
    }

    fn spawn_execution(
        mut claim: Claim,
        handler: Arc<dyn TaskHandler>,
        queue: Arc<BrokerQueue>,
        stats: Arc<Mutex<WorkerStats>>,
        task_timeout: u64,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let start = std::time::Instant::now();
            let outcome = timeout(
                Duration::from_secs(task_timeout),
                handler.handle(&claim.envelope.payload),
            )
            .await;
            let elapsed = start.elapsed();

            {
                let mut stats = stats.lock().await;
                stats.tasks_processed += 1;
                let n = stats.tasks_processed as f64;
                stats.average_execution_time_ms =
                    (stats.average_execution_time_ms * (n - 1.0) + elapsed.as_millis() as f64) / n;
            }

            match outcome {
                Ok(Ok(result)) => {
                    claim.envelope.mark_success(result);
                    stats.lock().await.tasks_successful += 1;
                    if let Err(e) = queue.complete(&claim).await {
                        error!("Failed to acknowledge task {}: {}", claim.envelope.id, e);
                    }
                    info!(
                        "Task {} completed successfully in {:?}",
                        claim.envelope.id, elapsed
                    );
                }
                Ok(Err(e)) => {
                    error!("Task {} failed: {}", claim.envelope.id, e);
                    claim.envelope.mark_failed(&e.to_string());
                    stats.lock().await.tasks_failed += 1;
                    if let Err(e) = queue.fail(&claim).await {
                        error!("Failed to acknowledge task {}: {}", claim.envelope.id, e);
                    }
                }
                Err(_) => {
                    let err = TaskError::timeout(format!(
                        "task execution exceeded {task_timeout} seconds"
                    ));
                    error!("Task {} timed out", claim.envelope.id);
                    claim.envelope.mark_failed(&err.to_string());
                    stats.lock().await.tasks_failed += 1;
                    if let Err(e) = queue.fail(&claim).await {
                        error!("Failed to acknowledge task {}: {}", claim.envelope.id, e);
                    }
                }
            }
        })
    }

    async fn reap_finished(active_tasks: &Arc<RwLock<HashMap<TaskId, tokio::task::JoinHandle<()>>>>) {
        let mut tasks = active_tasks.write().await;
        let finished: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in finished {
            tasks.remove(&id);
        }
    }

    /// Signal the worker to stop claiming new tasks
    pub async fn signal_shutdown(&self) {
        let mut shutdown = self.shutdown_signal.write().await;
        *shutdown = true;
    }

    /// Get a snapshot of the worker's counters
    pub async fn get_stats(&self) -> WorkerStats {
        self.stats.lock().await.clone()
    }

    /// Wait for in-flight tasks up to the grace period, then abort the rest
    async fn drain(&self) {
        let grace = Duration::from_secs(self.config.shutdown_grace_period);
        let start = std::time::Instant::now();

        while start.elapsed() < grace {
            Self::reap_finished(&self.active_tasks).await;
            let active = self.active_tasks.read().await.len();
            if active == 0 {
                return;
            }
            debug!("Waiting for {} active tasks to complete", active);
            sleep(Duration::from_millis(250)).await;
        }

        let tasks = self.active_tasks.read().await;
        for (task_id, handle) in tasks.iter() {
            warn!("Force stopping task {}", task_id);
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait::async_trait]
    impl TaskHandler for EchoHandler {
        fn can_handle(&self, task_name: &str) -> bool {
            task_name.starts_with("echo")
        }

        async fn handle(&self, payload: &str) -> TaskResult<String> {
            Ok(payload.to_string())
        }
    }

    struct RejectingHandler;

    #[async_trait::async_trait]
    impl TaskHandler for RejectingHandler {
        fn can_handle(&self, _task_name: &str) -> bool {
            false
        }

        async fn handle(&self, _payload: &str) -> TaskResult<String> {
            Err(TaskError::task_execution("always fails"))
        }
    }

    #[tokio::test]
    async fn registry_finds_exact_match() {
        let registry = TaskHandlerRegistry::default();
        registry.register("reject".to_string(), RejectingHandler).await;

        let handler = registry.find_handler("reject").await;
        assert!(handler.is_some());
    }

    #[tokio::test]
    async fn registry_falls_back_to_can_handle() {
        let registry = TaskHandlerRegistry::default();
        registry.register("echo".to_string(), EchoHandler).await;

        // Not registered under this exact name, but EchoHandler claims it.
        let handler = registry.find_handler("echo_v2").await;
        assert!(handler.is_some());
        assert_eq!(handler.unwrap().handle("hi").await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn registry_misses_unknown_names() {
        let registry = TaskHandlerRegistry::default();
        registry.register("reject".to_string(), RejectingHandler).await;

        assert!(registry.find_handler("unknown").await.is_none());
    }

    #[test]
    fn default_config_polls_the_default_queue() {
        let config = WorkerConfig::default();
        assert_eq!(config.queues, vec!["default".to_string()]);
        assert!(config.max_concurrent_tasks > 0);
    }
}
