use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Línea de log ya parseada.
///
/// Formato: `YYYY-MM-DD HH:MM:SS.mmm LEVEL mensaje[ in <N>ms]`
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub level: LogLevel,
    pub message: String,
    /// Presente si el mensaje termina en ` in <N>ms`.
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Other(String),
}

impl LogLevel {
    fn from_token(token: &str) -> Result<Self, ParseError> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ParseError::InvalidLevel(token.to_string()));
        }
        Ok(match token {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            other => LogLevel::Other(other.to_string()),
        })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => f.write_str("DEBUG"),
            LogLevel::Info => f.write_str("INFO"),
            LogLevel::Warn => f.write_str("WARN"),
            LogLevel::Error => f.write_str("ERROR"),
            LogLevel::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("línea vacía")]
    Empty,
    #[error("falta el campo {0}")]
    MissingField(&'static str),
    #[error("timestamp inválido: {0}")]
    InvalidTimestamp(String),
    #[error("nivel inválido: {0}")]
    InvalidLevel(String),
    #[error("tiempo de respuesta fuera de rango: {0}")]
    InvalidResponseTime(String),
}

/// Parsea una línea (sin el `\n` final).
pub fn parse_line(text: &str) -> Result<LogEntry, ParseError> {
    let line = text.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parts = line.splitn(4, ' ');
    let date = parts.next().ok_or(ParseError::MissingField("date"))?;
    let time = parts.next().ok_or(ParseError::MissingField("time"))?;
    let level = parts.next().ok_or(ParseError::MissingField("level"))?;
    let message = parts.next().ok_or(ParseError::MissingField("message"))?;

    let raw_ts = format!("{} {}", date, time);
    let timestamp = NaiveDateTime::parse_from_str(&raw_ts, TIMESTAMP_FORMAT)
        .map_err(|_| ParseError::InvalidTimestamp(raw_ts.clone()))?;

    let level = LogLevel::from_token(level)?;
    let response_time_ms = trailing_response_time(message)?;

    Ok(LogEntry {
        timestamp,
        level,
        message: message.to_string(),
        response_time_ms,
    })
}

/// `"... in 127ms"` -> `Some(127)`.
fn trailing_response_time(message: &str) -> Result<Option<u64>, ParseError> {
    let Some(rest) = message.strip_suffix("ms") else {
        return Ok(None);
    };
    let Some((head, digits)) = rest.rsplit_once(' ') else {
        return Ok(None);
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }
    if !(head == "in" || head.ends_with(" in")) {
        return Ok(None);
    }

    digits
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ParseError::InvalidResponseTime(digits.to_string()))
}
