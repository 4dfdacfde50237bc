use clap::Parser;
use std::time::Duration;

/// Worker de procesamiento de chunks de log
#[derive(Parser, Debug, Clone)]
#[command(name = "worker", version)]
pub struct WorkerConfig {
    /// Id estable del worker; por defecto `<hostname>-<port>`
    #[arg(long, env = "WORKER_ID")]
    pub id: Option<String>,

    #[arg(long, env = "WORKER_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "WORKER_PORT", default_value_t = 8001)]
    pub port: u16,

    /// URL base del coordinador. Sin ella el worker no se registra solo.
    #[arg(long, env = "COORDINATOR_URL")]
    pub coordinator: Option<String>,

    /// URL con la que el coordinador llega a este worker
    #[arg(long, env = "WORKER_ADVERTISE_URL")]
    pub advertise_url: Option<String>,

    #[arg(long, env = "HEARTBEAT_SECS", default_value_t = 5)]
    pub heartbeat_secs: u64,
}

impl WorkerConfig {
    pub fn worker_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", local_hostname(), self.port))
    }

    pub fn advertise_url(&self) -> String {
        self.advertise_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", local_hostname(), self.port))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_win_over_defaults() {
        let cfg = WorkerConfig::try_parse_from([
            "worker",
            "--id",
            "worker_1",
            "--port",
            "8002",
            "--coordinator",
            "http://localhost:8000",
            "--advertise-url",
            "http://10.0.0.5:8002",
        ])
        .unwrap();

        assert_eq!(cfg.worker_id(), "worker_1");
        assert_eq!(cfg.advertise_url(), "http://10.0.0.5:8002");
        assert_eq!(cfg.coordinator.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn defaults_derive_from_hostname_and_port() {
        let cfg = WorkerConfig::try_parse_from(["worker", "--port", "9100"]).unwrap();

        assert!(cfg.worker_id().ends_with("-9100"));
        assert!(cfg.advertise_url().starts_with("http://"));
        assert!(cfg.advertise_url().ends_with(":9100"));
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(5));
    }
}
