// Transport en memoria para los tests del coordinador.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use common::{process_file_chunk, ChunkFailure, MetricsSummary, WorkRequest};

use crate::transport::WorkerTransport;

#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    /// Procesa el chunk de verdad contra el archivo local.
    ProcessLocally,
    /// Igual, pero tarda más o menos según el offset del chunk.
    DelayByOffset { reverse: bool },
    /// Nunca responde.
    Hang,
}

#[derive(Default)]
struct MockState {
    calls: Vec<(String, WorkRequest)>,
    failing_workers: HashMap<String, ChunkFailure>,
    failing_chunks: HashMap<u64, ChunkFailure>,
    down: HashSet<String>,
    probes: Vec<String>,
    concurrent: usize,
    max_concurrent: usize,
}

#[derive(Clone)]
pub struct MockTransport {
    behavior: MockBehavior,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Todo `send_work` hacia este endpoint falla con `failure`.
    pub fn fail_worker(&self, endpoint: &str, failure: ChunkFailure) {
        self.state
            .lock()
            .unwrap()
            .failing_workers
            .insert(endpoint.to_string(), failure);
    }

    /// El chunk que empieza en `byte_start` falla siempre, en cualquier worker.
    pub fn fail_chunk_at(&self, byte_start: u64, failure: ChunkFailure) {
        self.state
            .lock()
            .unwrap()
            .failing_chunks
            .insert(byte_start, failure);
    }

    /// Los probes a este endpoint fallan (o vuelven a funcionar).
    pub fn set_down(&self, endpoint: &str, down: bool) {
        let mut state = self.state.lock().unwrap();
        if down {
            state.down.insert(endpoint.to_string());
        } else {
            state.down.remove(endpoint);
        }
    }

    pub fn calls(&self) -> Vec<(String, WorkRequest)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn probes(&self) -> Vec<String> {
        self.state.lock().unwrap().probes.clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().unwrap().max_concurrent
    }

    fn enter(&self, endpoint: &str, request: &WorkRequest) -> Option<ChunkFailure> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((endpoint.to_string(), request.clone()));
        state.concurrent += 1;
        state.max_concurrent = state.max_concurrent.max(state.concurrent);

        state
            .failing_workers
            .get(endpoint)
            .or_else(|| state.failing_chunks.get(&request.start))
            .cloned()
    }

    fn leave(&self) {
        self.state.lock().unwrap().concurrent -= 1;
    }
}

impl WorkerTransport for MockTransport {
    async fn send_work(
        &self,
        endpoint: &str,
        request: &WorkRequest,
    ) -> Result<MetricsSummary, ChunkFailure> {
        let injected = self.enter(endpoint, request);

        match self.behavior {
            MockBehavior::Hang => std::future::pending::<()>().await,
            MockBehavior::ProcessLocally => tokio::task::yield_now().await,
            MockBehavior::DelayByOffset { reverse } => {
                let step = request.start / 10;
                let millis = if reverse { 100_000u64.saturating_sub(step) } else { step };
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }
        }
        self.leave();

        if let Some(failure) = injected {
            return Err(failure);
        }
        process_file_chunk(request.to_chunk()).outcome
    }

    async fn probe(&self, endpoint: &str) -> Result<(), ChunkFailure> {
        let mut state = self.state.lock().unwrap();
        state.probes.push(endpoint.to_string());
        if state.down.contains(endpoint) {
            Err(ChunkFailure::Transport("connection refused".into()))
        } else {
            Ok(())
        }
    }
}
