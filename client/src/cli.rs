use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::{
    DistributeRequest, DistributionReport, ErrorBody, WorkerRegisterRequest,
    WorkerRegisterResponse, WorkerView,
};
use reqwest::{Client, Response};

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el coordinador")]
struct Cli {
    /// URL base del coordinador
    #[arg(
        long,
        env = "COORDINATOR_URL",
        default_value = "http://localhost:8000",
        global = true
    )]
    coordinator: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Procesa un archivo de log repartiéndolo entre los workers
    Distribute {
        /// Ruta del archivo tal como la ven los workers
        #[arg(value_name = "ARCHIVO")]
        file: String,

        /// Tamaño objetivo de chunk en bytes
        #[arg(long)]
        chunk_bytes: Option<u64>,
    },
    /// Lista los workers registrados
    Workers,
    /// Da de alta un worker a mano
    Register {
        #[arg(value_name = "WORKER_ID")]
        id: String,
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Retira un worker del pool
    Deregister {
        #[arg(value_name = "WORKER_ID")]
        id: String,
    },
}

fn api_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

// Saca el mensaje de `{ "error": ... }` si lo hay
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => format!("{} (status {})", body.error, status),
        Err(_) => format!("status {}", status),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = cli.coordinator;

    match cli.command {
        Commands::Distribute { file, chunk_bytes } => {
            let url = api_url(&base_url, "/api/v1/distribute");
            let req = DistributeRequest {
                filepath: file,
                chunk_bytes,
            };

            let resp = client.post(&url).json(&req).send().await?;
            if !resp.status().is_success() {
                bail!("la distribución falló: {}", error_message(resp).await);
            }

            let report: DistributionReport = resp.json().await?;
            println!("Distribución completada:");
            println!("  run_id   : {}", report.run_id);
            println!("  archivo  : {}", report.filepath);
            println!("  chunks   : {}", report.chunks);
            println!("  errores  : {}", report.summary.error_count);
            println!(
                "  respuestas: {} (total {} ms)",
                report.summary.response_count, report.summary.response_time_total
            );
            println!("  promedio : {:.2} ms", report.average_response_time);
        }

        Commands::Workers => {
            let url = api_url(&base_url, "/api/v1/workers");
            let resp = client.get(&url).send().await?;
            if !resp.status().is_success() {
                bail!("error consultando workers: {}", error_message(resp).await);
            }

            let workers: Vec<WorkerView> = resp.json().await?;
            if workers.is_empty() {
                println!("No hay workers registrados.");
            }
            for w in workers {
                println!("Worker {}", w.worker_id);
                println!("  endpoint       : {}", w.endpoint);
                println!("  estado         : {}", w.status);
                println!("  retirado       : {}", w.retired);
                println!("  fallos seguidos: {}", w.consecutive_failures);
                match w.last_heartbeat_secs_ago {
                    Some(secs) => println!("  last_heartbeat : {} s ago", secs),
                    None => println!("  last_heartbeat : (nunca)"),
                }
                println!(
                    "  chunks         : ok={}, failed={}",
                    w.chunks_succeeded, w.chunks_failed
                );
                println!();
            }
        }

        Commands::Register { id, url: endpoint } => {
            let url = api_url(&base_url, "/api/v1/workers/register");
            let resp = client
                .post(&url)
                .json(&WorkerRegisterRequest {
                    worker_id: id,
                    endpoint,
                })
                .send()
                .await?;
            if !resp.status().is_success() {
                bail!("registro rechazado: {}", error_message(resp).await);
            }

            let body: WorkerRegisterResponse = resp.json().await?;
            if body.created {
                println!("Worker {} registrado.", body.worker_id);
            } else {
                println!("Worker {} ya existía, endpoint actualizado.", body.worker_id);
            }
        }

        Commands::Deregister { id } => {
            let url = api_url(&base_url, &format!("/api/v1/workers/{}", id));
            let resp = client.delete(&url).send().await?;
            if resp.status().is_success() {
                println!("Worker {} retirado.", id);
            } else {
                bail!("no se pudo retirar {}: {}", id, error_message(resp).await);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribute_takes_file_and_optional_chunk_size() {
        let cli = Cli::try_parse_from([
            "client",
            "--coordinator",
            "http://coord:8000/",
            "distribute",
            "/data/app.log",
            "--chunk-bytes",
            "4096",
        ])
        .unwrap();

        assert_eq!(cli.coordinator, "http://coord:8000/");
        match cli.command {
            Commands::Distribute { file, chunk_bytes } => {
                assert_eq!(file, "/data/app.log");
                assert_eq!(chunk_bytes, Some(4096));
            }
            other => panic!("subcomando inesperado: {:?}", other),
        }
    }

    #[test]
    fn register_needs_id_and_url() {
        assert!(Cli::try_parse_from(["client", "register", "worker_1"]).is_err());

        let cli =
            Cli::try_parse_from(["client", "register", "worker_1", "http://localhost:8001"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Register { .. }));
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        assert_eq!(
            api_url("http://coord:8000/", "/api/v1/workers"),
            "http://coord:8000/api/v1/workers"
        );
        assert_eq!(
            api_url("http://coord:8000", "/api/v1/workers/w1"),
            "http://coord:8000/api/v1/workers/w1"
        );
    }
}
