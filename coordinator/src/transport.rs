use std::{future::Future, time::Duration};

use common::{ChunkFailure, ErrorBody, HealthResponse, MetricsSummary, WorkRequest};
use reqwest::Client;

/// Canal request/response hacia los workers.
///
/// La implementación real es HTTP; los tests usan un mock en memoria.
pub trait WorkerTransport: Send + Sync + 'static {
    /// `POST {endpoint}/work`
    fn send_work(
        &self,
        endpoint: &str,
        request: &WorkRequest,
    ) -> impl Future<Output = Result<MetricsSummary, ChunkFailure>> + Send;

    /// `GET {endpoint}/health`
    fn probe(&self, endpoint: &str) -> impl Future<Output = Result<(), ChunkFailure>> + Send;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

fn url(endpoint: &str, path: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), path)
}

fn transport_failure(e: reqwest::Error) -> ChunkFailure {
    if e.is_timeout() {
        ChunkFailure::Timeout
    } else {
        ChunkFailure::Transport(e.to_string())
    }
}

// Un 200 puede traer métricas o `{"error": ...}`: el worker respondió igual
fn decode_work_reply(body: &[u8]) -> Result<MetricsSummary, ChunkFailure> {
    if let Ok(metrics) = serde_json::from_slice::<MetricsSummary>(body) {
        return Ok(metrics);
    }
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => Err(err.into_failure()),
        Err(e) => Err(ChunkFailure::Transport(format!(
            "respuesta inválida del worker: {}",
            e
        ))),
    }
}

impl WorkerTransport for HttpTransport {
    async fn send_work(
        &self,
        endpoint: &str,
        request: &WorkRequest,
    ) -> Result<MetricsSummary, ChunkFailure> {
        let resp = self
            .client
            .post(url(endpoint, "/work"))
            .json(request)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = resp.status();
        if status.is_success() {
            let body = resp.bytes().await.map_err(transport_failure)?;
            return decode_work_reply(&body);
        }

        // el worker avisa con {"error": ...}; si no se puede leer, nos quedamos con el status
        match resp.json::<ErrorBody>().await {
            Ok(body) => Err(body.into_failure()),
            Err(_) => Err(ChunkFailure::Remote(format!("status {}", status))),
        }
    }

    async fn probe(&self, endpoint: &str) -> Result<(), ChunkFailure> {
        let resp = self
            .client
            .get(url(endpoint, "/health"))
            .send()
            .await
            .map_err(transport_failure)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChunkFailure::Transport(format!("status {}", status)));
        }

        let body: HealthResponse = resp.json().await.map_err(transport_failure)?;
        if body.is_healthy() {
            Ok(())
        } else {
            Err(ChunkFailure::Remote(format!("status reportado: {}", body.status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;

    // Levanta un worker falso que responde siempre lo mismo a /work
    async fn fake_worker(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/work",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request() -> WorkRequest {
        WorkRequest {
            filepath: "/data/app.log".to_string(),
            start: 0,
            size: 100,
        }
    }

    #[tokio::test]
    async fn error_body_with_200_is_not_a_transport_failure() {
        let endpoint = fake_worker(
            StatusCode::OK,
            serde_json::json!({"error": "[Errno 2] No such file"}),
        )
        .await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport.send_work(&endpoint, &request()).await.unwrap_err();

        assert_eq!(err, ChunkFailure::Remote("[Errno 2] No such file".into()));
        assert!(!err.affects_health());
    }

    #[tokio::test]
    async fn io_error_body_with_200_keeps_io_kind() {
        let endpoint = fake_worker(
            StatusCode::OK,
            serde_json::json!({"error": "no such file", "kind": "io"}),
        )
        .await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let err = transport.send_work(&endpoint, &request()).await.unwrap_err();
        assert_eq!(err, ChunkFailure::Io("no such file".into()));
    }

    #[tokio::test]
    async fn metrics_report_is_decoded() {
        let endpoint = fake_worker(
            StatusCode::OK,
            serde_json::json!({
                "error_count": 1,
                "total_response_time": 250,
                "response_count": 2,
                "average_response_time": 125.0
            }),
        )
        .await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let metrics = transport.send_work(&endpoint, &request()).await.unwrap();
        assert_eq!(
            metrics,
            MetricsSummary {
                error_count: 1,
                response_time_total: 250,
                response_count: 2,
            }
        );
    }

    #[test]
    fn garbage_reply_is_transport_failure() {
        let err = decode_work_reply(br#"{"foo": 1}"#).unwrap_err();
        assert!(matches!(err, ChunkFailure::Transport(_)));
        assert!(err.affects_health());
    }

    #[test]
    fn url_joins_without_double_slash() {
        assert_eq!(url("http://w1:8001/", "/work"), "http://w1:8001/work");
        assert_eq!(url("http://w1:8001", "/health"), "http://w1:8001/health");
    }
}
