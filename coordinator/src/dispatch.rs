use std::{collections::VecDeque, io, sync::Arc, time::Duration};

use common::{
    plan_file, ChunkDescriptor, ChunkFailure, DistributionReport, MetricsSummary, WorkerId,
};
use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::state::{Registry, WorkerSlot};
use crate::transport::WorkerTransport;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_FAN_OUT: usize = 8;
pub const DEFAULT_CHUNK_BYTES: u64 = 64 * 1024;

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("no hay workers sanos disponibles")]
    NoHealthyWorkers,

    #[error("el chunk {chunk} falló {attempts} intentos (último error: {last_error})")]
    ChunkUnrecoverable {
        chunk: ChunkDescriptor,
        attempts: u32,
        last_error: ChunkFailure,
    },

    #[error("no se pudo leer {path}: {source}")]
    InputUnavailable {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_attempts: u32,
    /// Máximo de chunks en vuelo a la vez.
    pub fan_out: usize,
    pub request_timeout: Duration,
    pub default_chunk_bytes: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fan_out: DEFAULT_FAN_OUT,
            request_timeout: Duration::from_secs(5),
            default_chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

/// Un intento concreto: qué chunk, a qué worker, número de intento (desde 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkAssignment {
    pub chunk: ChunkDescriptor,
    pub worker_id: WorkerId,
    /// endpoint del worker al momento de asignar
    pub endpoint: String,
    pub attempt: u32,
}

// Chunk pendiente (o en vuelo) con su historial de intentos.
#[derive(Debug)]
struct PendingChunk {
    chunk: ChunkDescriptor,
    attempts: u32,
    tried: Vec<WorkerId>,
    last_failed: Option<WorkerId>,
}

impl PendingChunk {
    fn new(chunk: ChunkDescriptor) -> Self {
        Self {
            chunk,
            attempts: 0,
            tried: Vec::new(),
            last_failed: None,
        }
    }
}

/// Round-robin sobre un conjunto de workers que puede cambiar entre rondas.
///
/// Recuerda el `seq` del último worker asignado; en la ronda siguiente
/// continúa con el primer worker sano registrado después de ese, aunque el
/// anterior haya desaparecido del snapshot.
#[derive(Debug, Default)]
pub struct RoundRobin {
    last_seq: Option<u64>,
}

impl RoundRobin {
    /// Elige el siguiente worker para un chunk. Prefiere workers que todavía
    /// no lo intentaron; si no quedan, evita al que acaba de fallar cuando
    /// hay más de uno. `None` sólo si el snapshot está vacío.
    pub fn pick<'a>(
        &mut self,
        snapshot: &'a [WorkerSlot],
        tried: &[WorkerId],
        just_failed: Option<&str>,
    ) -> Option<&'a WorkerSlot> {
        if snapshot.is_empty() {
            return None;
        }

        let start = self
            .last_seq
            .and_then(|last| snapshot.iter().position(|w| w.seq > last))
            .unwrap_or(0);
        let n = snapshot.len();
        let in_turn = || (0..n).map(move |i| &snapshot[(start + i) % n]);

        let chosen = in_turn()
            .find(|w| !tried.contains(&w.id))
            .or_else(|| in_turn().find(|w| n > 1 && Some(w.id.as_str()) != just_failed))
            .unwrap_or(&snapshot[start]);

        self.last_seq = Some(chosen.seq);
        Some(chosen)
    }
}

type AttemptOutcome = (PendingChunk, WorkAssignment, Result<MetricsSummary, ChunkFailure>);

pub struct Dispatcher<T> {
    registry: Registry,
    transport: Arc<T>,
    config: DispatchConfig,
}

impl<T: WorkerTransport> Dispatcher<T> {
    pub fn new(registry: Registry, transport: Arc<T>, config: DispatchConfig) -> Self {
        Self {
            registry,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Sólo el resumen global de `distribute_report`.
    #[cfg(test)]
    pub async fn distribute(
        &self,
        file: &str,
        target_chunk_bytes: u64,
    ) -> Result<MetricsSummary, DistributionError> {
        self.distribute_report(file, target_chunk_bytes)
            .await
            .map(|report| report.summary)
    }

    /// Divide el archivo, reparte los chunks y devuelve el resumen global
    /// junto con el id de corrida y la cantidad de chunks.
    ///
    /// O todos los chunks aportan su resultado o la llamada falla entera;
    /// nunca se devuelve un resumen parcial. Si el future se descarta, los
    /// requests en vuelo se abandonan y no se despachan más chunks.
    pub async fn distribute_report(
        &self,
        file: &str,
        target_chunk_bytes: u64,
    ) -> Result<DistributionReport, DistributionError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("distribute", run_id = %run_id, file = %file);

        async {
            let (summary, chunks) = self.run(file, target_chunk_bytes).await?;
            info!(
                "distribución completa: {} chunks, errores={}, respuestas={}, promedio={:.1}ms",
                chunks,
                summary.error_count,
                summary.response_count,
                summary.average_response_time()
            );
            Ok::<_, DistributionError>(DistributionReport::new(
                run_id.clone(),
                file.to_string(),
                chunks,
                summary,
            ))
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        file: &str,
        target_chunk_bytes: u64,
    ) -> Result<(MetricsSummary, usize), DistributionError> {
        // sin workers sanos no tocamos el archivo
        if self.registry.healthy_snapshot().is_empty() {
            warn!("no hay workers sanos, se cancela la distribución");
            return Err(DistributionError::NoHealthyWorkers);
        }

        let chunks = self.plan(file, target_chunk_bytes).await?;
        let total_chunks = chunks.len();
        info!("{} dividido en {} chunks", file, total_chunks);

        let max_attempts = self.config.max_attempts.max(1);
        let fan_out = self.config.fan_out.max(1);

        let mut pending: VecDeque<PendingChunk> =
            chunks.into_iter().map(PendingChunk::new).collect();
        let mut in_flight = FuturesUnordered::new();
        let mut rr = RoundRobin::default();
        let mut total = MetricsSummary::identity();

        loop {
            // 1) ronda de asignación sobre un snapshot del pool sano
            if !pending.is_empty() && in_flight.len() < fan_out {
                let snapshot = self.registry.healthy_snapshot();

                while in_flight.len() < fan_out {
                    let Some(mut p) = pending.pop_front() else {
                        break;
                    };
                    let Some(slot) = rr.pick(&snapshot, &p.tried, p.last_failed.as_deref())
                    else {
                        warn!(
                            "no quedan workers sanos con {} chunks pendientes",
                            pending.len() + 1
                        );
                        return Err(DistributionError::NoHealthyWorkers);
                    };

                    p.attempts += 1;
                    if !p.tried.contains(&slot.id) {
                        p.tried.push(slot.id.clone());
                    }

                    let assignment = WorkAssignment {
                        chunk: p.chunk.clone(),
                        worker_id: slot.id.clone(),
                        endpoint: slot.endpoint.clone(),
                        attempt: p.attempts,
                    };
                    debug!(
                        "asignando chunk {} al worker {} (attempt={})",
                        assignment.chunk, assignment.worker_id, assignment.attempt
                    );
                    in_flight.push(self.attempt(p, assignment));
                }
            }

            // 2) esperar el próximo resultado, en el orden que lleguen
            let Some((mut p, assignment, result)) = in_flight.next().await else {
                break;
            };
            self.registry
                .record_dispatch(&assignment.worker_id, &assignment.endpoint, &result);

            match result {
                Ok(metrics) => {
                    debug!(
                        "chunk {} completado por {}: {:?}",
                        assignment.chunk, assignment.worker_id, metrics
                    );
                    total = total.merge(metrics);
                }
                Err(failure) if p.attempts >= max_attempts => {
                    error!(
                        "chunk {} superó el máximo de intentos ({}): {}",
                        p.chunk, max_attempts, failure
                    );
                    return Err(DistributionError::ChunkUnrecoverable {
                        chunk: p.chunk,
                        attempts: p.attempts,
                        last_error: failure,
                    });
                }
                Err(failure) => {
                    warn!(
                        "chunk {} falló en {} (attempt={}): {}, reencolando",
                        p.chunk, assignment.worker_id, p.attempts, failure
                    );
                    p.last_failed = Some(assignment.worker_id);
                    pending.push_front(p);
                }
            }
        }

        Ok((total, total_chunks))
    }

    async fn plan(
        &self,
        file: &str,
        target_chunk_bytes: u64,
    ) -> Result<Vec<ChunkDescriptor>, DistributionError> {
        let path = file.to_string();
        let planned =
            tokio::task::spawn_blocking(move || plan_file(&path, target_chunk_bytes)).await;

        match planned {
            Ok(Ok(chunks)) => Ok(chunks),
            Ok(Err(source)) => Err(DistributionError::InputUnavailable {
                path: file.to_string(),
                source,
            }),
            Err(join) => Err(DistributionError::InputUnavailable {
                path: file.to_string(),
                source: io::Error::new(io::ErrorKind::Other, join.to_string()),
            }),
        }
    }

    async fn attempt(
        &self,
        pending: PendingChunk,
        assignment: WorkAssignment,
    ) -> AttemptOutcome {
        let request = assignment.chunk.to_request();
        let send = self.transport.send_work(&assignment.endpoint, &request);

        // un timeout cuenta igual que un fallo de transporte
        let result = match tokio::time::timeout(self.config.request_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ChunkFailure::Timeout),
        };

        (pending, assignment, result)
    }
}
