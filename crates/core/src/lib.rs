//! livetalk-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von Audio-, Session- und
//! App-Crate gemeinsam genutzt werden: den globalen Fehler-Enum, die
//! Session-ID und den Session-Zustand.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{LiveTalkError, Result};
pub use types::{SessionId, SessionState};
