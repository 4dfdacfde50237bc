use crate::state::{Registry, WorkerSlot};
use crate::transport::WorkerTransport;
use common::WorkerStatus;
use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 1;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub failure_threshold: u32,
    pub probe_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROBE_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            probe_timeout: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Loop del monitor de salud: cada `interval` sondea a todos los workers
/// registrados y actualiza su estado. Nunca borra entradas del registro.
pub async fn monitor_workers<T: WorkerTransport>(
    registry: Registry,
    transport: Arc<T>,
    config: MonitorConfig,
) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        probe_round(&registry, transport.as_ref(), &config).await;
    }
}

/// Una pasada de probes, todos en paralelo. Devuelve cuántos workers
/// cambiaron de estado.
pub async fn probe_round<T: WorkerTransport>(
    registry: &Registry,
    transport: &T,
    config: &MonitorConfig,
) -> usize {
    let targets = registry.probe_targets();
    if targets.is_empty() {
        return 0;
    }

    let probes = targets.into_iter().map(|slot| async move {
        let ok = match timeout(config.probe_timeout, transport.probe(&slot.endpoint)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("probe a {} falló: {}", slot.id, e);
                false
            }
            Err(_) => {
                debug!("probe a {} sin respuesta tras {:?}", slot.id, config.probe_timeout);
                false
            }
        };
        (slot, ok)
    });

    let mut changed = 0;
    for (slot, ok) in join_all(probes).await {
        if apply(registry, &slot, ok, config.failure_threshold) {
            changed += 1;
        }
    }
    changed
}

fn apply(registry: &Registry, slot: &WorkerSlot, ok: bool, threshold: u32) -> bool {
    let Some(change) = registry.record_probe(&slot.id, &slot.endpoint, ok, threshold) else {
        return false;
    };

    match change.to {
        WorkerStatus::Healthy => info!(
            "worker {} ({}) pasa de {} a HEALTHY",
            slot.id, slot.endpoint, change.from
        ),
        WorkerStatus::Unreachable => warn!(
            "marcando worker {} ({}) como UNREACHABLE ({} fallos seguidos)",
            slot.id, slot.endpoint, change.consecutive_failures
        ),
        WorkerStatus::Unknown => {}
    }
    true
}
