//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigurationsdatei):
//! - `LT_LOG_LEVEL`: Filter-Direktive (z.B. `debug` oder `livetalk_session=trace`),
//!   Standard: info
//! - `LT_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Ausgabe geht nach stderr, stdout bleibt fuer die Konsolen-Steuerung frei.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Level
pub const ENV_LOG_LEVEL: &str = "LT_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "LT_LOG_FORMAT";

// WebSocket-Crates loggen jeden Frame auf debug
const LEISE_CRATES: &str = "tungstenite=warn,tokio_tungstenite=warn,rustls=warn";

#[derive(Debug, Error)]
pub enum LoggingFehler {
    #[error("Unbekanntes Log-Format: {0}")]
    UnbekanntesFormat(String),

    #[error("Logging bereits initialisiert")]
    BereitsInitialisiert,
}

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(LoggingFehler::UnbekanntesFormat(other.to_string())),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `LT_LOG_LEVEL` und `LT_LOG_FORMAT` haben Vorrang vor den Argumenten.
/// Ein ungueltiger Level faellt auf `info` zurueck, ein ungueltiges Format
/// ist ein Fehler.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<(), LoggingFehler> {
    let direktive = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| level.to_string());
    let filter = filter_bauen(&direktive);

    let format: LogFormat = std::env::var(ENV_LOG_FORMAT)
        .unwrap_or_else(|_| format.to_string())
        .parse()?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    ergebnis.map_err(|_| LoggingFehler::BereitsInitialisiert)
}

fn filter_bauen(direktive: &str) -> EnvFilter {
    EnvFilter::try_new(format!("{},{}", direktive, LEISE_CRATES))
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{}", LEISE_CRATES)))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}
