//! Broker client with Redis-backed queues and result storage
//!
//! Task messages travel through per-queue Redis lists. A claimed message is
//! moved onto a processing list and stays there until the worker
//! acknowledges it, so an unacknowledged claim remains visible on the
//! broker. Terminal envelopes are written to the result backend keyed by
//! task id, with a TTL from the settings.

use redis::aio::Connection;
use redis::Client;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{TaskError, TaskResult};
use crate::task::{TaskEnvelope, TaskId};

const QUEUE_KEY: &str = "wtq:queue";
const PROCESSING_KEY: &str = "wtq:processing";
const TASK_KEY: &str = "wtq:task";
const RESULT_KEY: &str = "wtq:result";

fn queue_key(queue: &str) -> String {
    format!("{QUEUE_KEY}:{queue}")
}

fn processing_key(queue: &str) -> String {
    format!("{PROCESSING_KEY}:{queue}")
}

fn task_key(task_id: TaskId) -> String {
    format!("{TASK_KEY}:{task_id}")
}

fn result_key(task_id: TaskId) -> String {
    format!("{RESULT_KEY}:{task_id}")
}

/// A task message claimed from the broker.
///
/// Holds the raw wire form alongside the decoded envelope; the raw form is
/// the receipt used to remove the message from the processing list on
/// acknowledge, regardless of how the envelope is mutated in between.
#[derive(Debug)]
pub struct Claim {
    /// The decoded task message
    pub envelope: TaskEnvelope,
    receipt: String,
}

/// Redis-backed broker client shared by producers and workers
#[derive(Debug)]
pub struct BrokerQueue {
    broker: Client,
    results: Client,
    settings: Settings,
}

impl BrokerQueue {
    /// Connect to the broker and result backend described by the settings.
    ///
    /// Settings are validated first and the broker is PINGed, so an
    /// unreachable or misconfigured broker fails at startup.
    pub async fn connect(settings: &Settings) -> TaskResult<Self> {
        settings.validate()?;

        let broker = Client::open(settings.broker_url.as_str())
            .map_err(|e| TaskError::queue_operation("connect", e.to_string()))?;
        let results = Client::open(settings.result_backend_url.as_str())
            .map_err(|e| TaskError::queue_operation("connect", e.to_string()))?;

        let mut conn = broker
            .get_async_connection()
            .await
            .map_err(|e| TaskError::queue_operation("connect", e.to_string()))?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| TaskError::queue_operation("ping", e.to_string()))?;

        info!("Connected to broker at {}", settings.broker_url);

        Ok(Self {
            broker,
            results,
            settings: settings.clone(),
        })
    }

    async fn broker_connection(&self) -> TaskResult<Connection> {
        self.broker
            .get_async_connection()
            .await
            .map_err(|e| TaskError::queue_operation("get_connection", e.to_string()))
    }

    async fn result_connection(&self) -> TaskResult<Connection> {
        self.results
            .get_async_connection()
            .await
            .map_err(|e| TaskError::queue_operation("get_connection", e.to_string()))
    }

    /// The queue tasks are routed to when no queue is named
    pub fn default_queue(&self) -> &str {
        &self.settings.default_queue
    }

    /// Push a task message onto its queue.
    ///
    /// Fire-and-forget from the producer's perspective: the call returns as
    /// soon as the broker has stored the message, long before any worker
    /// executes it.
    pub async fn enqueue(&self, mut envelope: TaskEnvelope) -> TaskResult<TaskId> {
        let mut conn = self.broker_connection().await?;

        if envelope.queue.is_empty() {
            envelope.queue = self.settings.default_queue.clone();
        }

        let message = serde_json::to_string(&envelope)?;
        redis::pipe()
            .lpush(queue_key(&envelope.queue), &message)
            .ignore()
            .hset(task_key(envelope.id), "data", &message)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| TaskError::queue_operation("enqueue", e.to_string()))?;

        debug!("Enqueued task {} on queue {}", envelope.id, envelope.queue);
        Ok(envelope.id)
    }

    /// Claim the oldest message on a queue, if any.
    ///
    /// The message is moved onto the queue's processing list in the same
    /// broker command, so a claim that is never acknowledged is still
    /// accounted for on the broker side.
    pub async fn claim_next(&self, queue: &str) -> TaskResult<Option<Claim>> {
        let mut conn = self.broker_connection().await?;

        let receipt: Option<String> = redis::cmd("RPOPLPUSH")
            .arg(queue_key(queue))
            .arg(processing_key(queue))
            .query_async(&mut conn)
            .await
            .map_err(|e| TaskError::queue_operation("claim", e.to_string()))?;

        match receipt {
            Some(receipt) => {
                let envelope: TaskEnvelope = serde_json::from_str(&receipt)?;
                debug!("Claimed task {} from queue {}", envelope.id, queue);
                Ok(Some(Claim { envelope, receipt }))
            }
            None => Ok(None),
        }
    }

    /// Acknowledge a successful execution
    pub async fn complete(&self, claim: &Claim) -> TaskResult<()> {
        self.acknowledge(claim).await?;
        debug!("Marked task {} as completed", claim.envelope.id);
        Ok(())
    }

    /// Acknowledge a failed execution.
    ///
    /// No requeue happens here: a failed task is terminal and its envelope
    /// is written to the result backend like any other outcome.
    pub async fn fail(&self, claim: &Claim) -> TaskResult<()> {
        self.acknowledge(claim).await?;
        debug!("Marked task {} as failed", claim.envelope.id);
        Ok(())
    }

    async fn acknowledge(&self, claim: &Claim) -> TaskResult<()> {
        let envelope = &claim.envelope;
        let message = serde_json::to_string(envelope)?;

        let mut conn = self.broker_connection().await?;
        redis::pipe()
            .lrem(processing_key(&envelope.queue), 1, &claim.receipt)
            .ignore()
            .hset(task_key(envelope.id), "data", &message)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| TaskError::queue_operation("acknowledge", e.to_string()))?;

        let mut results = self.result_connection().await?;
        redis::pipe()
            .hset(result_key(envelope.id), "data", &message)
            .ignore()
            .expire(result_key(envelope.id), self.settings.result_ttl as i64)
            .ignore()
            .query_async::<_, ()>(&mut results)
            .await
            .map_err(|e| TaskError::queue_operation("store_result", e.to_string()))?;

        Ok(())
    }

    /// Fetch a task's current envelope.
    ///
    /// Terminal envelopes come from the result backend; a task that has not
    /// finished yet is read from its broker-side record instead.
    pub async fn fetch(&self, task_id: TaskId) -> TaskResult<Option<TaskEnvelope>> {
        let mut results = self.result_connection().await?;
        let stored: Option<String> = redis::cmd("HGET")
            .arg(result_key(task_id))
            .arg("data")
            .query_async(&mut results)
            .await
            .map_err(|e| TaskError::queue_operation("fetch_result", e.to_string()))?;

        let stored = match stored {
            Some(json) => Some(json),
            None => {
                let mut conn = self.broker_connection().await?;
                redis::cmd("HGET")
                    .arg(task_key(task_id))
                    .arg("data")
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| TaskError::queue_operation("fetch_task", e.to_string()))?
            }
        };

        match stored {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Number of messages waiting on a queue
    pub async fn pending(&self, queue: &str) -> TaskResult<u64> {
        let mut conn = self.broker_connection().await?;
        redis::cmd("LLEN")
            .arg(queue_key(queue))
            .query_async(&mut conn)
            .await
            .map_err(|e| TaskError::queue_operation("pending", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_queue() {
        assert_eq!(queue_key("default"), "wtq:queue:default");
        assert_eq!(processing_key("default"), "wtq:processing:default");
    }

    #[test]
    fn task_and_result_keys_embed_the_id() {
        let id = TaskId::new_v4();
        assert_eq!(task_key(id), format!("wtq:task:{id}"));
        assert_eq!(result_key(id), format!("wtq:result:{id}"));
    }
}
