//! HTTP surface: one GET endpoint that enqueues the deferred task
//!
//! The handler demonstrates non-blocking dispatch: it records a timestamp,
//! hands the task to the broker, records a second timestamp and responds
//! with both. The two are expected to be nearly identical regardless of how
//! long the task itself takes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::TaskClient;
use crate::error::{TaskError, TaskResult};
use crate::tasks::SleepReport;

/// Shared state for the request handlers
#[derive(Clone)]
pub struct AppState {
    client: Arc<TaskClient>,
}

impl AppState {
    pub fn new(client: Arc<TaskClient>) -> Self {
        Self { client }
    }
}

/// Response body for the dispatch endpoint.
///
/// The key names and RFC 3339 timestamps are part of the contract.
#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    #[serde(rename = "Request time")]
    pub request_time: DateTime<Utc>,
    #[serde(rename = "Response time")]
    pub response_time: DateTime<Utc>,
}

/// Error wrapper turning pipeline errors into HTTP responses.
///
/// An enqueue failure is surfaced synchronously as a 500: the enqueue call
/// is the handler's only observable effect, so dropping it silently would
/// leave the client with a success response and no task.
pub struct ApiError(TaskError);

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Enqueue the deferred task and answer immediately with both timestamps
async fn dispatch(State(state): State<AppState>) -> Result<Json<DispatchResponse>, ApiError> {
    let request_time = Utc::now();
    let task_id = state.client.delay(&SleepReport).await?;
    let response_time = Utc::now();

    debug!("Dispatched task {task_id}");
    Ok(Json(DispatchResponse {
        request_time,
        response_time,
    }))
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "The requested resource was not found")
}

/// Build the application router
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dispatch))
        .fallback(handler_404)
        .with_state(state)
}

/// Handle for managing the HTTP server lifecycle
pub struct ServerHandle {
    shutdown_token: CancellationToken,
    task_handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Initiate graceful shutdown and wait for the server to stop
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        info!("Initiating server graceful shutdown");
        self.shutdown_token.cancel();
        self.task_handle.await
    }
}

/// Bind the configured address and serve the router until shutdown
pub async fn serve(bind: SocketAddr, state: AppState) -> TaskResult<(SocketAddr, ServerHandle)> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let local_addr = listener.local_addr()?;

    let shutdown_token = CancellationToken::new();
    let server_token = shutdown_token.clone();

    let app = app_router(state);
    let task_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
        {
            tracing::error!("HTTP server error: {e}");
        }
    });

    info!("Serving HTTP on {local_addr}");
    Ok((local_addr, ServerHandle {
        shutdown_token,
        task_handle,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_uses_the_contract_keys() {
        let now = Utc::now();
        let response = DispatchResponse {
            request_time: now,
            response_time: now,
        };

        let value = serde_json::to_value(&response).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("Request time"));
        assert!(object.contains_key("Response time"));
        assert_eq!(object.len(), 2);
    }

    #[test]
    fn timestamps_serialize_as_rfc3339() {
        let response = DispatchResponse {
            request_time: "2024-05-01T18:30:39.362125Z".parse().unwrap(),
            response_time: "2024-05-01T18:30:39.401552Z".parse().unwrap(),
        };

        let value = serde_json::to_value(&response).unwrap();
        let raw = value["Request time"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(raw).is_ok());
        assert!(response.response_time >= response.request_time);
    }

    #[test]
    fn enqueue_failures_map_to_500() {
        let error = ApiError(TaskError::queue_operation("enqueue", "broker unreachable"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
