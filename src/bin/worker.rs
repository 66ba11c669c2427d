//! Worker-launch command: polls the broker and executes deferred tasks

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use web_task_queue::tasks::{SleepReportHandler, SLEEP_REPORT_TASK};
use web_task_queue::{BrokerQueue, Settings, Worker, WorkerConfig};

#[derive(Debug, Parser)]
#[command(name = "worker", about = "Run a worker pool against the task broker")]
struct Cli {
    /// Queue to poll (defaults to the configured default queue)
    #[arg(short = 'Q', long)]
    queue: Option<String>,

    /// Log level filter (e.g. info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Number of tasks this worker may execute concurrently
    #[arg(short, long, default_value_t = 4)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let settings = Settings::from_env().context("loading settings")?;
    let queue = Arc::new(
        BrokerQueue::connect(&settings)
            .await
            .context("connecting to broker")?,
    );

    let config = WorkerConfig {
        queues: vec![cli
            .queue
            .unwrap_or_else(|| settings.default_queue.clone())],
        max_concurrent_tasks: cli.concurrency,
        ..WorkerConfig::default()
    };

    let worker = Arc::new(Worker::new(config, queue));
    worker
        .register_handler(
            SLEEP_REPORT_TASK.to_string(),
            SleepReportHandler::new(&settings),
        )
        .await;

    let signal_worker = worker.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, draining worker");
            signal_worker.signal_shutdown().await;
        }
    });

    worker.run().await.context("running worker")?;
    Ok(())
}
