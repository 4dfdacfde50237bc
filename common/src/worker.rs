use std::fmt;

use serde::{Deserialize, Serialize};

pub type WorkerId = String;

/// Estado de salud de un worker según el monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Unknown,
    Healthy,
    Unreachable,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Unknown => "UNKNOWN",
            WorkerStatus::Healthy => "HEALTHY",
            WorkerStatus::Unreachable => "UNREACHABLE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterRequest {
    pub worker_id: WorkerId,
    /// URL base del worker, ej: "http://10.0.0.5:8001"
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterResponse {
    pub worker_id: WorkerId,
    /// false si el id ya estaba registrado y sólo se actualizó
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatRequest {
    pub worker_id: WorkerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatResponse {
    pub ok: bool,
}

/// Respuesta de `GET /health`, tanto en el worker como en el coordinador.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Vista de un worker para `GET /api/v1/workers`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerView {
    pub worker_id: WorkerId,
    pub endpoint: String,
    pub status: WorkerStatus,
    pub consecutive_failures: u32,
    pub retired: bool,
    pub last_heartbeat_secs_ago: Option<u64>,
    pub chunks_succeeded: u64,
    pub chunks_failed: u64,
}
