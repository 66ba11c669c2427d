//! The request-serving process: binds the HTTP endpoint and enqueues tasks

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use web_task_queue::server::{serve, AppState};
use web_task_queue::{Settings, TaskClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env().context("loading settings")?;
    let client = TaskClient::connect(&settings)
        .await
        .context("connecting to broker")?;

    let state = AppState::new(Arc::new(client));
    let (addr, handle) = serve(settings.http_bind, state)
        .await
        .context("starting HTTP server")?;
    info!("Dispatch endpoint ready at http://{addr}/");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    handle.shutdown().await.context("stopping HTTP server")?;

    Ok(())
}
