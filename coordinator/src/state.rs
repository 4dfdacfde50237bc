// coordinator/src/state.rs

use chrono::{DateTime, Utc};
use common::{ChunkFailure, MetricsSummary, WorkerId, WorkerStatus, WorkerView};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("worker desconocido: {0}")]
    UnknownWorker(WorkerId),
}

/// Datos de liveness de un worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    pub id: WorkerId,
    pub endpoint: String,
    pub status: WorkerStatus,
    pub consecutive_failures: u32,
}

/// Cambio de estado producido por un probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: WorkerStatus,
    pub to: WorkerStatus,
    pub consecutive_failures: u32,
}

impl Worker {
    pub fn new(id: impl Into<WorkerId>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            status: WorkerStatus::Unknown,
            consecutive_failures: 0,
        }
    }

    /// Máquina de estados de salud:
    /// - un probe OK pasa a HEALTHY (desde UNKNOWN o UNREACHABLE) y resetea fallos
    /// - `threshold` fallos seguidos pasan a UNREACHABLE
    pub fn apply_probe(&mut self, ok: bool, threshold: u32) -> Option<StatusChange> {
        let from = self.status;

        if ok {
            self.consecutive_failures = 0;
            self.status = WorkerStatus::Healthy;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            if self.consecutive_failures >= threshold.max(1) {
                self.status = WorkerStatus::Unreachable;
            }
        }

        (from != self.status).then_some(StatusChange {
            from,
            to: self.status,
            consecutive_failures: self.consecutive_failures,
        })
    }
}

/// Entrada del snapshot que usa la asignación y el monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    pub id: WorkerId,
    pub endpoint: String,
    /// orden de registro (creciente, nunca se reutiliza)
    pub seq: u64,
}

#[derive(Debug, Clone)]
struct WorkerEntry {
    worker: Worker,
    seq: u64,
    retired: bool,
    last_heartbeat: Option<DateTime<Utc>>,

    // Métricas
    chunks_succeeded: u64,
    chunks_failed: u64,
}

impl WorkerEntry {
    fn slot(&self) -> WorkerSlot {
        WorkerSlot {
            id: self.worker.id.clone(),
            endpoint: self.worker.endpoint.clone(),
            seq: self.seq,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    // ordenado por registro; nunca se borran entradas
    entries: Vec<WorkerEntry>,
    index: HashMap<WorkerId, usize>,
    next_seq: u64,
}

impl RegistryInner {
    fn get_mut(&mut self, id: &str) -> Option<&mut WorkerEntry> {
        let pos = *self.index.get(id)?;
        self.entries.get_mut(pos)
    }
}

/// Registro compartido de workers.
///
/// Todo acceso pasa por un único mutex, así que la asignación siempre ve un
/// snapshot consistente del estado. Sólo el monitor cambia `status`.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra un worker. Si el id ya existe actualiza el endpoint, lo
    /// reactiva y lo deja en UNKNOWN hasta el próximo probe.
    /// Devuelve true si la entrada es nueva.
    pub fn register(&self, id: &str, endpoint: &str) -> bool {
        let mut inner = self.lock();

        if let Some(entry) = inner.get_mut(id) {
            entry.worker = Worker::new(id, endpoint);
            entry.retired = false;
            return false;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let pos = inner.entries.len();
        inner.entries.push(WorkerEntry {
            worker: Worker::new(id, endpoint),
            seq,
            retired: false,
            last_heartbeat: None,
            chunks_succeeded: 0,
            chunks_failed: 0,
        });
        inner.index.insert(id.to_string(), pos);
        true
    }

    /// Saca al worker del pool sin borrarlo (sigue en los listados).
    pub fn deregister(&self, id: &str) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        let entry = inner
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWorker(id.to_string()))?;
        entry.retired = true;
        Ok(())
    }

    pub fn heartbeat(&self, id: &str) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        let entry = inner
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWorker(id.to_string()))?;
        entry.last_heartbeat = Some(Utc::now());
        Ok(())
    }

    /// Workers HEALTHY y activos, en orden de registro.
    pub fn healthy_snapshot(&self) -> Vec<WorkerSlot> {
        self.lock()
            .entries
            .iter()
            .filter(|e| !e.retired && e.worker.status == WorkerStatus::Healthy)
            .map(WorkerEntry::slot)
            .collect()
    }

    /// Todos los workers que el monitor debe sondear.
    pub fn probe_targets(&self) -> Vec<WorkerSlot> {
        self.lock()
            .entries
            .iter()
            .filter(|e| !e.retired)
            .map(WorkerEntry::slot)
            .collect()
    }

    /// Aplica el resultado de un probe. Se ignora si entre tanto el worker
    /// fue retirado o se re-registró con otro endpoint.
    pub fn record_probe(
        &self,
        id: &str,
        endpoint: &str,
        ok: bool,
        threshold: u32,
    ) -> Option<StatusChange> {
        let mut inner = self.lock();
        let entry = inner.get_mut(id)?;
        if entry.retired || entry.worker.endpoint != endpoint {
            return None;
        }
        entry.worker.apply_probe(ok, threshold)
    }

    /// Contabiliza un intento de dispatch. Los fallos de transporte o
    /// timeout suman a `consecutive_failures`; el estado lo decide el monitor.
    /// Se ignora si el worker se re-registró con otro endpoint.
    pub fn record_dispatch(
        &self,
        id: &str,
        endpoint: &str,
        result: &Result<MetricsSummary, ChunkFailure>,
    ) {
        let mut inner = self.lock();
        let Some(entry) = inner.get_mut(id) else {
            return;
        };
        if entry.worker.endpoint != endpoint {
            return;
        }
        match result {
            Ok(_) => entry.chunks_succeeded += 1,
            Err(failure) => {
                entry.chunks_failed += 1;
                if failure.affects_health() {
                    entry.worker.consecutive_failures =
                        entry.worker.consecutive_failures.saturating_add(1);
                }
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<Worker> {
        let inner = self.lock();
        let pos = *inner.index.get(id)?;
        inner.entries.get(pos).map(|e| e.worker.clone())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn views(&self) -> Vec<WorkerView> {
        let now = Utc::now();
        self.lock()
            .entries
            .iter()
            .map(|e| WorkerView {
                worker_id: e.worker.id.clone(),
                endpoint: e.worker.endpoint.clone(),
                status: e.worker.status,
                consecutive_failures: e.worker.consecutive_failures,
                retired: e.retired,
                last_heartbeat_secs_ago: e
                    .last_heartbeat
                    .map(|t| (now - t).num_seconds().max(0) as u64),
                chunks_succeeded: e.chunks_succeeded,
                chunks_failed: e.chunks_failed,
            })
            .collect()
    }
}
