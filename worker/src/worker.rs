use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{process_file_chunk, ErrorBody, HealthResponse, MetricsReport, WorkRequest};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Estado compartido por los handlers del worker.
#[derive(Clone)]
pub struct WorkerState {
    pub worker_id: String,
}

pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/work", post(handle_work))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// Procesa un chunk del archivo y devuelve sus métricas
async fn handle_work(
    State(state): State<WorkerState>,
    Json(req): Json<WorkRequest>,
) -> Result<Json<MetricsReport>, (StatusCode, Json<ErrorBody>)> {
    let chunk = req.to_chunk();
    info!("worker {} recibió chunk {}", state.worker_id, chunk);

    // lectura + parseo son bloqueantes
    let result = tokio::task::spawn_blocking(move || process_file_chunk(chunk))
        .await
        .map_err(|e| {
            warn!("panic o join error procesando chunk: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(e.to_string())),
            )
        })?;

    match result.outcome {
        Ok(summary) => Ok(Json(MetricsReport::from(summary))),
        Err(failure) => {
            warn!("error procesando chunk {}: {}", result.chunk, failure);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::from(&failure)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        response::Response,
    };
    use common::{ChunkFailure, MetricsSummary};
    use serde::de::DeserializeOwned;
    use std::{fs, path::PathBuf};
    use tower::ServiceExt;

    const SAMPLE: &str = "2024-01-24 10:15:32.123 INFO Request processed in 127ms\n\
                          2024-01-24 10:15:33.001 ERROR Database connection failed\n\
                          2024-01-24 10:15:34.042 INFO Request processed in 95ms\n";

    fn temp_dir(sub: &str) -> PathBuf {
        let base = std::env::temp_dir().join("worker_http_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn app() -> Router {
        build_router(WorkerState {
            worker_id: "worker_1".to_string(),
        })
    }

    fn work(req: &WorkRequest) -> Request<Body> {
        Request::post("/work")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(req).unwrap()))
            .unwrap()
    }

    async fn read_json<B: DeserializeOwned>(resp: Response) -> B {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_says_healthy() {
        let resp = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = read_json(resp).await;
        assert_eq!(body, serde_json::json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn work_returns_metrics_for_range() {
        let tmp = temp_dir("ok");
        let path = tmp.join("sample_logs.txt");
        fs::write(&path, SAMPLE).unwrap();

        let req = WorkRequest {
            filepath: path.to_string_lossy().to_string(),
            start: 0,
            size: SAMPLE.len() as u64,
        };
        let resp = app().oneshot(work(&req)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let report: MetricsReport = read_json(resp).await;
        assert_eq!(
            report.summary,
            MetricsSummary {
                error_count: 1,
                response_time_total: 222,
                response_count: 2,
            }
        );
        assert_eq!(report.average_response_time, 111.0);
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_io_error() {
        let tmp = temp_dir("missing");
        let req = WorkRequest {
            filepath: tmp.join("no_existe.log").to_string_lossy().to_string(),
            start: 0,
            size: 100,
        };

        let resp = app().oneshot(work(&req)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: ErrorBody = read_json(resp).await;
        assert!(matches!(body.into_failure(), ChunkFailure::Io(_)));
    }
}
