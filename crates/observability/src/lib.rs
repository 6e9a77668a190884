//! # livetalk-observability
//!
//! Structured Logging via tracing-subscriber (Text oder JSON), gesteuert
//! ueber Konfiguration und die Umgebungsvariablen `LT_LOG_LEVEL` /
//! `LT_LOG_FORMAT`.

pub mod logging;

pub use logging::{logging_initialisieren, LogFormat, LoggingFehler};
