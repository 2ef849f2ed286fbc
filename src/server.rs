//! REST and status-channel surface
//!
//! | Route | |
//! |---|---|
//! | `POST /experiments/start` | start an experiment, returns its id immediately |
//! | `GET /experiments` | every experiment, id and status |
//! | `GET /experiments/{id}/result` | one experiment, result `null` until completed |
//! | `GET /topologies/{name}` | normalized topology definition |
//! | `GET /ws` | WebSocket; one text frame per status line |
//! | `GET /health` | liveness |
//!
//! Errors come back as `{"error": <kind>, "detail": <message>}`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

use crate::broadcast::StatusBroadcaster;
use crate::experiment::{ExperimentRecord, ExperimentRequest, ExperimentStatus, ExperimentStore};
use crate::pipeline::Coordinator;
use crate::topology::Topology;
use crate::{Error, Result};

/// Error rendered as a structured JSON payload.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.0.root() {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = json!({ "error": self.0.kind(), "detail": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Response of `POST /experiments/start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    /// New experiment id
    pub experiment_id: u64,
}

/// Entry of `GET /experiments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    /// Experiment id
    pub id: u64,
    /// Cluster topology name
    pub topology: String,
    /// Current status
    pub status: ExperimentStatus,
}

/// Build the router.
pub fn router<S: ExperimentStore + 'static>(coordinator: Arc<Coordinator<S>>) -> Router {
    Router::new()
        .route("/experiments/start", post(start_experiment::<S>))
        .route("/experiments", get(list_experiments::<S>))
        .route("/experiments/{id}/result", get(experiment_result::<S>))
        .route("/topologies/{name}", get(topology::<S>))
        .route("/ws", get(status_channel::<S>))
        .route("/health", get(health))
        .with_state(coordinator)
}

/// Serve until the listener fails.
///
/// # Errors
///
/// IO errors from the listener.
pub async fn serve<S: ExperimentStore + 'static>(listener: TcpListener, coordinator: Arc<Coordinator<S>>) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router(coordinator)).await?;
    Ok(())
}

async fn start_experiment<S: ExperimentStore + 'static>(
    State(coordinator): State<Arc<Coordinator<S>>>,
    Json(request): Json<ExperimentRequest>,
) -> ApiResult<StartResponse> {
    if request.topology.trim().is_empty() {
        return Err(Error::InvalidInput("topology name is empty".to_string()).into());
    }
    let experiment_id = coordinator.start(request).await?;
    Ok(Json(StartResponse { experiment_id }))
}

async fn list_experiments<S: ExperimentStore + 'static>(
    State(coordinator): State<Arc<Coordinator<S>>>,
) -> ApiResult<Vec<ExperimentSummary>> {
    let summaries = coordinator
        .list()
        .await?
        .into_iter()
        .map(|r| ExperimentSummary {
            id: r.id(),
            topology: r.topology().to_string(),
            status: r.status(),
        })
        .collect();
    Ok(Json(summaries))
}

async fn experiment_result<S: ExperimentStore + 'static>(
    State(coordinator): State<Arc<Coordinator<S>>>,
    Path(id): Path<u64>,
) -> ApiResult<ExperimentRecord> {
    Ok(Json(coordinator.get(id).await?))
}

async fn topology<S: ExperimentStore + 'static>(
    State(coordinator): State<Arc<Coordinator<S>>>,
    Path(name): Path<String>,
) -> ApiResult<Topology> {
    Ok(Json(coordinator.topologies().fetch(&name).await?))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn status_channel<S: ExperimentStore + 'static>(
    ws: WebSocketUpgrade,
    State(coordinator): State<Arc<Coordinator<S>>>,
) -> Response {
    let broadcaster = Arc::clone(coordinator.broadcaster());
    ws.on_upgrade(move |socket| observe(socket, broadcaster))
}

/// Push status lines until either side goes away. Incoming frames are
/// ignored.
async fn observe(socket: WebSocket, broadcaster: Arc<StatusBroadcaster>) {
    let mut subscription = broadcaster.subscribe();
    let id = subscription.id();
    let (mut sink, mut stream) = socket.split();

    let mut push = tokio::spawn(async move {
        while let Some(line) = subscription.recv().await {
            if sink.send(Message::Text(line.into())).await.is_err() {
                break;
            }
        }
    });
    let mut drain = tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            if matches!(frame, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut push => drain.abort(),
        _ = &mut drain => push.abort(),
    }
    broadcaster.unsubscribe(id);
}
