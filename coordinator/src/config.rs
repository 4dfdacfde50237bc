use clap::Parser;
use std::time::Duration;

use crate::dispatch::{DispatchConfig, DEFAULT_CHUNK_BYTES, DEFAULT_FAN_OUT, DEFAULT_MAX_ATTEMPTS};
use crate::monitor::{MonitorConfig, DEFAULT_FAILURE_THRESHOLD};

/// Coordinador de procesamiento distribuido de logs
#[derive(Parser, Debug, Clone)]
#[command(name = "coordinator", version)]
pub struct CoordinatorConfig {
    /// Dirección donde escucha la API HTTP
    #[arg(long, env = "COORDINATOR_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "COORDINATOR_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Procesa este archivo al arrancar, imprime el resumen y termina
    #[arg(long, value_name = "PATH")]
    pub logfile: Option<String>,

    /// Worker registrado de forma estática (se puede repetir)
    #[arg(long = "worker", value_name = "ID=URL", value_parser = parse_worker_arg)]
    pub workers: Vec<(String, String)>,

    /// Tamaño objetivo de cada chunk en bytes
    #[arg(long, env = "CHUNK_BYTES", default_value_t = DEFAULT_CHUNK_BYTES)]
    pub chunk_bytes: u64,

    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Máximo de chunks en vuelo a la vez
    #[arg(long, env = "FAN_OUT", default_value_t = DEFAULT_FAN_OUT)]
    pub fan_out: usize,

    #[arg(long, env = "PROBE_INTERVAL_SECS", default_value_t = 5)]
    pub probe_interval_secs: u64,

    /// Probes fallidos seguidos antes de marcar un worker UNREACHABLE
    #[arg(long, env = "FAILURE_THRESHOLD", default_value_t = DEFAULT_FAILURE_THRESHOLD)]
    pub failure_threshold: u32,

    /// Timeout por request a un worker (por defecto, el intervalo de probe)
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

fn parse_worker_arg(s: &str) -> Result<(String, String), String> {
    let (id, url) = s
        .split_once('=')
        .ok_or_else(|| format!("se esperaba ID=URL, llegó '{}'", s))?;
    if id.is_empty() || url.is_empty() {
        return Err(format!("ID y URL no pueden estar vacíos: '{}'", s));
    }
    Ok((id.to_string(), url.to_string()))
}

impl CoordinatorConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map(|s| Duration::from_secs(s.max(1)))
            .unwrap_or_else(|| self.probe_interval())
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_attempts: self.max_attempts.max(1),
            fan_out: self.fan_out.max(1),
            request_timeout: self.request_timeout(),
            default_chunk_bytes: self.chunk_bytes.max(1),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: self.probe_interval(),
            failure_threshold: self.failure_threshold.max(1),
            probe_timeout: self.request_timeout(),
        }
    }
}
