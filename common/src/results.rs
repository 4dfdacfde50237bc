use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::ChunkDescriptor;
use crate::metrics::MetricsSummary;

/// Por qué falló un intento sobre un chunk. Todas las variantes son reintentables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkFailure {
    /// El worker no pudo leer el rango (archivo ilegible, rango fuera del archivo).
    #[error("error de I/O leyendo el chunk: {0}")]
    Io(String),
    /// La petición al worker no llegó o la respuesta no se entendió.
    #[error("error de transporte: {0}")]
    Transport(String),
    #[error("timeout esperando al worker")]
    Timeout,
    /// El worker respondió con un error que no es de I/O.
    #[error("el worker respondió con error: {0}")]
    Remote(String),
}

impl ChunkFailure {
    /// Fallos que cuentan contra la salud del worker (no llegamos a hablar con él).
    pub fn affects_health(&self) -> bool {
        matches!(self, ChunkFailure::Transport(_) | ChunkFailure::Timeout)
    }
}

/// Resultado de procesar un chunk: o métricas, o el fallo del intento.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub chunk: ChunkDescriptor,
    pub outcome: Result<MetricsSummary, ChunkFailure>,
}

impl ChunkResult {
    pub fn success(chunk: ChunkDescriptor, metrics: MetricsSummary) -> Self {
        Self {
            chunk,
            outcome: Ok(metrics),
        }
    }

    pub fn failure(chunk: ChunkDescriptor, error: ChunkFailure) -> Self {
        Self {
            chunk,
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Cuerpo de error en el wire: `{ "error": "..." }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    /// `"io"` cuando el worker no pudo leer el chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }

    pub fn io(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: Some("io".to_string()),
        }
    }

    /// Traduce la respuesta de error de un worker a un fallo de chunk.
    pub fn into_failure(self) -> ChunkFailure {
        match self.kind.as_deref() {
            Some("io") => ChunkFailure::Io(self.error),
            _ => ChunkFailure::Remote(self.error),
        }
    }
}

impl From<&ChunkFailure> for ErrorBody {
    fn from(failure: &ChunkFailure) -> Self {
        match failure {
            ChunkFailure::Io(msg) => ErrorBody::io(msg.clone()),
            other => ErrorBody::new(other.to_string()),
        }
    }
}
