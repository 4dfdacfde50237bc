use anyhow::{bail, Result};
use common::{WorkerHeartbeatRequest, WorkerRegisterRequest, WorkerRegisterResponse};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const FIRST_REGISTER_BACKOFF: Duration = Duration::from_secs(1);
const MAX_REGISTER_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, PartialEq, Eq)]
enum HeartbeatAck {
    Accepted,
    UnknownWorker,
}

/// Se registra en el coordinador y después manda heartbeats para siempre.
pub async fn run(
    client: Client,
    coordinator_url: String,
    worker_id: String,
    endpoint: String,
    interval: Duration,
) {
    register_until_ok(
        &client,
        &coordinator_url,
        &worker_id,
        &endpoint,
        FIRST_REGISTER_BACKOFF,
    )
    .await;

    loop {
        sleep(interval).await;

        match send_heartbeat(&client, &coordinator_url, &worker_id).await {
            Ok(HeartbeatAck::Accepted) => debug!("heartbeat enviado"),
            // el coordinador se reinició y nos olvidó
            Ok(HeartbeatAck::UnknownWorker) => {
                warn!("el coordinador no conoce a {}, re-registrando", worker_id);
                register_until_ok(
                    &client,
                    &coordinator_url,
                    &worker_id,
                    &endpoint,
                    FIRST_REGISTER_BACKOFF,
                )
                .await;
            }
            Err(e) => warn!("fallo enviando heartbeat: {:?}", e),
        }
    }
}

async fn register_until_ok(
    client: &Client,
    base_url: &str,
    worker_id: &str,
    endpoint: &str,
    first_backoff: Duration,
) -> WorkerRegisterResponse {
    let mut backoff = first_backoff;
    loop {
        match register(client, base_url, worker_id, endpoint).await {
            Ok(resp) => {
                info!(
                    "worker {} registrado en {} (nuevo={})",
                    resp.worker_id, base_url, resp.created
                );
                return resp;
            }
            Err(e) => {
                warn!("no se pudo registrar en {}: {:?}, reintento en {:?}", base_url, e, backoff);
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_REGISTER_BACKOFF);
            }
        }
    }
}

async fn register(
    client: &Client,
    base_url: &str,
    worker_id: &str,
    endpoint: &str,
) -> Result<WorkerRegisterResponse> {
    let url = format!("{}/api/v1/workers/register", base_url.trim_end_matches('/'));
    let res = client
        .post(&url)
        .json(&WorkerRegisterRequest {
            worker_id: worker_id.to_string(),
            endpoint: endpoint.to_string(),
        })
        .send()
        .await?;

    if !res.status().is_success() {
        bail!("registro rechazado: status {}", res.status());
    }
    Ok(res.json().await?)
}

async fn send_heartbeat(client: &Client, base_url: &str, worker_id: &str) -> Result<HeartbeatAck> {
    let url = format!("{}/heartbeat", base_url.trim_end_matches('/'));
    let res = client
        .post(&url)
        .json(&WorkerHeartbeatRequest {
            worker_id: worker_id.to_string(),
        })
        .send()
        .await?;

    if res.status() == StatusCode::NOT_FOUND {
        return Ok(HeartbeatAck::UnknownWorker);
    }
    if !res.status().is_success() {
        bail!("heartbeat rechazado: status {}", res.status());
    }
    Ok(HeartbeatAck::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        response::{IntoResponse, Response},
        routing::post,
        Json, Router,
    };
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::net::TcpListener;

    // Coordinador falso: rechaza los primeros `reject_registers` registros
    // y contesta todos los heartbeats con `heartbeat_status`.
    struct FakeCoordinator {
        registers: AtomicUsize,
        heartbeats: AtomicUsize,
        reject_registers: usize,
        heartbeat_status: StatusCode,
    }

    async fn fake_register(
        State(fake): State<Arc<FakeCoordinator>>,
        Json(req): Json<WorkerRegisterRequest>,
    ) -> Response {
        let n = fake.registers.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= fake.reject_registers {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        Json(WorkerRegisterResponse {
            worker_id: req.worker_id,
            created: n == fake.reject_registers + 1,
        })
        .into_response()
    }

    async fn fake_heartbeat(
        State(fake): State<Arc<FakeCoordinator>>,
        Json(_req): Json<WorkerHeartbeatRequest>,
    ) -> StatusCode {
        fake.heartbeats.fetch_add(1, Ordering::SeqCst);
        fake.heartbeat_status
    }

    async fn start_coordinator(
        reject_registers: usize,
        heartbeat_status: StatusCode,
    ) -> (String, Arc<FakeCoordinator>) {
        let fake = Arc::new(FakeCoordinator {
            registers: AtomicUsize::new(0),
            heartbeats: AtomicUsize::new(0),
            reject_registers,
            heartbeat_status,
        });
        let app = Router::new()
            .route("/api/v1/workers/register", post(fake_register))
            .route("/heartbeat", post(fake_heartbeat))
            .with_state(fake.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), fake)
    }

    #[tokio::test]
    async fn register_fails_on_rejected_status() {
        let (url, _) = start_coordinator(1, StatusCode::OK).await;
        let client = Client::new();

        let err = register(&client, &url, "worker_1", "http://localhost:8001")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));

        let resp = register(&client, &url, "worker_1", "http://localhost:8001")
            .await
            .unwrap();
        assert_eq!(resp.worker_id, "worker_1");
    }

    #[tokio::test]
    async fn register_until_ok_retries_until_accepted() {
        let (url, fake) = start_coordinator(2, StatusCode::OK).await;

        let resp = register_until_ok(
            &Client::new(),
            &url,
            "worker_1",
            "http://localhost:8001",
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(fake.registers.load(Ordering::SeqCst), 3);
        assert_eq!(resp.worker_id, "worker_1");
        assert!(resp.created);
    }

    #[tokio::test]
    async fn heartbeat_status_maps_to_ack() {
        let client = Client::new();

        let (url, _) = start_coordinator(0, StatusCode::OK).await;
        let ack = send_heartbeat(&client, &url, "worker_1").await.unwrap();
        assert_eq!(ack, HeartbeatAck::Accepted);

        let (url, _) = start_coordinator(0, StatusCode::NOT_FOUND).await;
        let ack = send_heartbeat(&client, &url, "worker_1").await.unwrap();
        assert_eq!(ack, HeartbeatAck::UnknownWorker);

        let (url, _) = start_coordinator(0, StatusCode::INTERNAL_SERVER_ERROR).await;
        let err = send_heartbeat(&client, &url, "worker_1").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn forgotten_worker_registers_again() {
        let (url, fake) = start_coordinator(0, StatusCode::NOT_FOUND).await;

        let handle = tokio::spawn(run(
            Client::new(),
            url,
            "worker_1".to_string(),
            "http://localhost:8001".to_string(),
            Duration::from_millis(20),
        ));

        // registro inicial + uno por cada heartbeat con 404
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while fake.registers.load(Ordering::SeqCst) < 2 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        handle.abort();

        assert!(waited.is_ok(), "el worker no volvió a registrarse");
        assert!(fake.heartbeats.load(Ordering::SeqCst) >= 1);
    }
}
