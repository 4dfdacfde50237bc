use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use common::{
    DistributeRequest, DistributionReport, ErrorBody, HealthResponse, WorkerHeartbeatRequest,
    WorkerHeartbeatResponse, WorkerRegisterRequest, WorkerRegisterResponse, WorkerView,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::dispatch::{DistributionError, Dispatcher};
use crate::state::{Registry, RegistryError};
use crate::transport::WorkerTransport;

pub struct AppState<T> {
    pub registry: Registry,
    pub dispatcher: Arc<Dispatcher<T>>,
}

// derive(Clone) pediría T: Clone
impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

pub fn build_router<T: WorkerTransport>(state: AppState<T>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/heartbeat", post(heartbeat::<T>))
        .route("/api/v1/workers", get(list_workers::<T>))
        .route("/api/v1/workers/register", post(register_worker::<T>))
        .route("/api/v1/workers/:id", delete(deregister_worker::<T>))
        .route("/api/v1/distribute", post(distribute::<T>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- errores HTTP ---------------- */

pub struct ApiError(StatusCode, ErrorBody);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError(StatusCode::NOT_FOUND, ErrorBody::new(e.to_string()))
    }
}

impl From<DistributionError> for ApiError {
    fn from(e: DistributionError) -> Self {
        let status = match e {
            DistributionError::NoHealthyWorkers => StatusCode::SERVICE_UNAVAILABLE,
            DistributionError::ChunkUnrecoverable { .. } => StatusCode::BAD_GATEWAY,
            DistributionError::InputUnavailable { .. } => StatusCode::NOT_FOUND,
        };
        ApiError(status, ErrorBody::new(e.to_string()))
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// Heartbeat push de un worker: sólo anota la hora, la salud la decide el monitor
async fn heartbeat<T: WorkerTransport>(
    State(state): State<AppState<T>>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Result<Json<WorkerHeartbeatResponse>, ApiError> {
    state.registry.heartbeat(&req.worker_id)?;
    Ok(Json(WorkerHeartbeatResponse { ok: true }))
}

async fn register_worker<T: WorkerTransport>(
    State(state): State<AppState<T>>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Json<WorkerRegisterResponse> {
    let created = state.registry.register(&req.worker_id, &req.endpoint);

    if created {
        info!("worker registrado: {} en {}", req.worker_id, req.endpoint);
    } else {
        info!(
            "worker {} se re-registró en {}, queda UNKNOWN hasta el próximo probe",
            req.worker_id, req.endpoint
        );
    }

    Json(WorkerRegisterResponse {
        worker_id: req.worker_id,
        created,
    })
}

async fn deregister_worker<T: WorkerTransport>(
    State(state): State<AppState<T>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.deregister(&id)?;
    info!("worker {} retirado del pool", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_workers<T: WorkerTransport>(
    State(state): State<AppState<T>>,
) -> Json<Vec<WorkerView>> {
    Json(state.registry.views())
}

// Corre una distribución completa y devuelve el resumen global
async fn distribute<T: WorkerTransport>(
    State(state): State<AppState<T>>,
    Json(req): Json<DistributeRequest>,
) -> Result<Json<DistributionReport>, ApiError> {
    let chunk_bytes = req
        .chunk_bytes
        .unwrap_or(state.dispatcher.config().default_chunk_bytes);

    match state
        .dispatcher
        .distribute_report(&req.filepath, chunk_bytes)
        .await
    {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            warn!("distribución de {} falló: {}", req.filepath, e);
            Err(e.into())
        }
    }
}
