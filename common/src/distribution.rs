use serde::{Deserialize, Serialize};

use crate::metrics::MetricsSummary;

/// Body de `POST /api/v1/distribute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributeRequest {
    pub filepath: String,
    /// Tamaño objetivo de chunk; si falta se usa el del coordinador.
    #[serde(default)]
    pub chunk_bytes: Option<u64>,
}

/// Resultado de una distribución completa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionReport {
    pub run_id: String,
    pub filepath: String,
    pub chunks: usize,
    pub summary: MetricsSummary,
    pub average_response_time: f64,
}

impl DistributionReport {
    pub fn new(run_id: String, filepath: String, chunks: usize, summary: MetricsSummary) -> Self {
        Self {
            run_id,
            filepath,
            chunks,
            average_response_time: summary.average_response_time(),
            summary,
        }
    }
}
