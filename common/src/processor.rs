use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
};

use tracing::debug;

use crate::chunk::ChunkDescriptor;
use crate::logline::{parse_line, LogEntry, LogLevel};
use crate::metrics::MetricsSummary;
use crate::results::{ChunkFailure, ChunkResult};

/// Marca que identifica los registros con tiempo de respuesta.
const RESPONSE_TIME_MARKER: &str = "processed in";

/// Contadores de registros de un chunk (sólo para logs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub parsed: u64,
    pub skipped: u64,
}

/// Procesa un chunk: lee el rango, parsea cada registro y resume métricas.
///
/// Un registro mal formado se salta; un fallo de lectura se devuelve como
/// `ChunkFailure::Io` dentro del resultado, nunca como panic.
pub fn process<R>(chunk: ChunkDescriptor, read_range: R) -> ChunkResult
where
    R: FnOnce(&str, u64, u64) -> io::Result<Vec<u8>>,
{
    let data = match read_range(&chunk.file_path, chunk.byte_start, chunk.byte_end) {
        Ok(data) => data,
        Err(e) => {
            let failure = ChunkFailure::Io(e.to_string());
            return ChunkResult::failure(chunk, failure);
        }
    };

    let (metrics, stats) = summarize_records(&data);
    debug!(
        "chunk {} procesado: {} registros, {} saltados",
        chunk, stats.parsed, stats.skipped
    );

    ChunkResult::success(chunk, metrics)
}

/// Procesa un chunk leyendo directamente del disco.
pub fn process_file_chunk(chunk: ChunkDescriptor) -> ChunkResult {
    process(chunk, read_file_range)
}

/// Resume los registros (separados por `\n`) de un bloque de bytes.
pub fn summarize_records(data: &[u8]) -> (MetricsSummary, RecordStats) {
    let mut metrics = MetricsSummary::identity();
    let mut stats = RecordStats::default();

    for raw in data.split(|b| *b == b'\n') {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        let entry = match std::str::from_utf8(raw) {
            Ok(text) => parse_line(text),
            Err(_) => {
                stats.skipped += 1;
                continue;
            }
        };

        match entry {
            Ok(entry) => {
                stats.parsed += 1;
                apply_entry(&mut metrics, &entry);
            }
            Err(e) => {
                debug!("registro mal formado, se salta: {}", e);
                stats.skipped += 1;
            }
        }
    }

    (metrics, stats)
}

// ERROR y "processed in" son excluyentes por registro.
fn apply_entry(metrics: &mut MetricsSummary, entry: &LogEntry) {
    if entry.level == LogLevel::Error {
        metrics.record_error();
    } else if entry.message.contains(RESPONSE_TIME_MARKER) {
        if let Some(ms) = entry.response_time_ms {
            metrics.record_response_time(ms);
        }
    }
}

/// Lee exactamente `[start, end)`. Un rango fuera del archivo es error.
pub fn read_file_range(path: &str, start: u64, end: u64) -> io::Result<Vec<u8>> {
    if end < start {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("rango invertido {}..{}", start, end),
        ));
    }

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if end > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "rango {}..{} fuera de {} (tamaño {})",
                start, end, path, len
            ),
        ));
    }

    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; (end - start) as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
