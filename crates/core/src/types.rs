//! Gemeinsame Typen fuer livetalk
//!
//! Die Session-ID verwendet das Newtype-Pattern wie alle IDs im Projekt,
//! der Session-Zustand ist die Projektion die eine Oberflaeche liest.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID einer Live-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Zustand einer Live-Session
///
/// Wird ausschliesslich vom Session-Controller veraendert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Keine Session, Geraete freigegeben
    #[default]
    Idle,
    /// Geraete geoeffnet, Verbindung wartet auf Bestaetigung
    Connecting,
    /// Verbindung bestaetigt, Aufnahme und Wiedergabe laufen
    Active,
    /// Teardown laeuft
    Closing,
    /// Fataler Fehler, muss quittiert werden
    Error,
}

impl SessionState {
    /// Gibt true zurueck wenn die Session Geraete oder Verbindung haelt
    pub fn ist_belegt(&self) -> bool {
        matches!(self, Self::Connecting | Self::Active | Self::Closing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_eindeutig() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b, "Zwei neue SessionIds muessen verschieden sein");
    }

    #[test]
    fn session_id_display() {
        let id = SessionId(Uuid::nil());
        assert!(id.to_string().starts_with("session:"));
    }

    #[test]
    fn zustand_standard_ist_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn belegte_zustaende() {
        assert!(SessionState::Connecting.ist_belegt());
        assert!(SessionState::Active.ist_belegt());
        assert!(SessionState::Closing.ist_belegt());
        assert!(!SessionState::Idle.ist_belegt());
        assert!(!SessionState::Error.ist_belegt());
    }

    #[test]
    fn zustand_ist_serde_kompatibel() {
        let json = serde_json::to_string(&SessionState::Active).unwrap();
        let zurueck: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, SessionState::Active);
    }
}
