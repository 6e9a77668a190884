//! Fehlertypen fuer die Audio-Engine

use livetalk_core::LiveTalkError;
use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Engine
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Kein Standard-Eingabegeraet verfuegbar")]
    KeinStandardEingabegeraet,

    #[error("Kein Standard-Ausgabegeraet verfuegbar")]
    KeinStandardAusgabegeraet,

    #[error("Mikrofonzugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Formatfehler: {0}")]
    FormatFehler(String),

    #[error("Dekodierfehler: {0}")]
    DecodeFehler(String),

    #[error("Audio-Kontext bereits geschlossen")]
    KontextGeschlossen,

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl From<AudioError> for LiveTalkError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::ZugriffVerweigert(grund) => LiveTalkError::ZugriffVerweigert(grund),
            AudioError::FormatFehler(grund) => LiveTalkError::Format(grund),
            AudioError::DecodeFehler(grund) => LiveTalkError::Dekodierung(grund),
            AudioError::Konfiguration(grund) => LiveTalkError::Konfiguration(grund),
            andere => LiveTalkError::Audio(andere.to_string()),
        }
    }
}
