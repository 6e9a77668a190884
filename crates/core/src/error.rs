//! Fehlertypen fuer livetalk
//!
//! Zentraler Fehler-Enum der alle Fehlerzustaende einer Live-Session abdeckt.
//! Untermodule (z.B. das Audio-Crate) definieren eigene Fehler und
//! konvertieren via `From` in diesen Typ.

use thiserror::Error;

use crate::types::SessionState;

/// Globaler Result-Alias fuer livetalk
pub type Result<T> = std::result::Result<T, LiveTalkError>;

/// Alle moeglichen Fehler im livetalk-System
#[derive(Debug, Error)]
pub enum LiveTalkError {
    // --- Geraete ---
    /// Mikrofonzugriff verweigert, die Session erreicht nie `Connecting`
    #[error("Mikrofonzugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Audiofehler: {0}")]
    Audio(String),

    // --- Verbindung ---
    /// Fehler der Live-Verbindung, fatal fuer die laufende Session
    #[error("Transportfehler: {0}")]
    Transport(String),

    // --- Session ---
    #[error("Session bereits aktiv (Zustand: {0:?})")]
    SessionBelegt(SessionState),

    #[error("Ungueltiger Zustandswechsel: {aktion} im Zustand {zustand:?}")]
    UngueltigerZustand {
        aktion: &'static str,
        zustand: SessionState,
    },

    // --- Codec ---
    /// Verletzung einer Codec-Invariante (Laenge passt nicht zur Kanalanzahl)
    #[error("Formatfehler: {0}")]
    Format(String),

    /// Einzelnes eingehendes Paket nicht dekodierbar
    #[error("Dekodierfehler: {0}")]
    Dekodierung(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl LiveTalkError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Aufrufer einen neuen Versuch anbieten kann
    ///
    /// Die Session selbst wiederholt nie; das ist Sache der Oberflaeche.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ZugriffVerweigert(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = LiveTalkError::ZugriffVerweigert("kein Eingabegeraet".into());
        assert_eq!(
            e.to_string(),
            "Mikrofonzugriff verweigert: kein Eingabegeraet"
        );
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(LiveTalkError::Transport("reset".into()).ist_wiederholbar());
        assert!(LiveTalkError::ZugriffVerweigert("nein".into()).ist_wiederholbar());
        assert!(!LiveTalkError::SessionBelegt(SessionState::Active).ist_wiederholbar());
        assert!(!LiveTalkError::Format("x".into()).ist_wiederholbar());
    }

    #[test]
    fn zustandsfehler_enthaelt_aktion() {
        let e = LiveTalkError::UngueltigerZustand {
            aktion: "start",
            zustand: SessionState::Error,
        };
        assert!(e.to_string().contains("start"));
        assert!(e.to_string().contains("Error"));
    }
}
