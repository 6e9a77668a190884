//! Anwendungs-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass livetalk ohne Konfigurationsdatei
//! lauffaehig ist.

use livetalk_audio::{
    CaptureConfig, PcmFormat, PlaybackConfig, CAPTURE_FRAME_SIZE, CAPTURE_SAMPLE_RATE,
    OUTPUT_SAMPLE_RATE,
};
use livetalk_observability::logging::{log_format_gueltig, log_level_gueltig};
use livetalk_session::config::{MODALITAET_AUDIO, STANDARD_MODELL, STANDARD_STIMME};
use livetalk_session::ws::STANDARD_ENDPUNKT;
use livetalk_session::{SessionConfig, SessionSetup};
use serde::{Deserialize, Serialize};

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Parameter fuer das Modell
    pub session: SessionEinstellungen,
    /// Verbindung zur Live-API
    pub verbindung: VerbindungsEinstellungen,
    /// Audio-Geraete und -Formate
    pub audio: AudioEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Parameter die beim Oeffnen der Session uebertragen werden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionEinstellungen {
    pub modell: String,
    /// Name der synthetischen Stimme
    pub stimme: String,
    /// Persona-Text (optional)
    pub systemanweisung: Option<String>,
    /// Antwort-Modalitaet, fuer Sprach-Sessions "AUDIO"
    pub modalitaet: String,
}

impl Default for SessionEinstellungen {
    fn default() -> Self {
        Self {
            modell: STANDARD_MODELL.into(),
            stimme: STANDARD_STIMME.into(),
            systemanweisung: None,
            modalitaet: MODALITAET_AUDIO.into(),
        }
    }
}

/// Verbindungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// WebSocket-Endpunkt
    pub endpunkt: String,
    /// Name der Umgebungsvariable mit dem API-Schluessel
    pub api_key_env: String,
    /// Kapazitaet der Sende-Queue in Frames
    pub sende_queue: usize,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            endpunkt: STANDARD_ENDPUNKT.into(),
            api_key_env: "GEMINI_API_KEY".into(),
            sende_queue: 64,
        }
    }
}

/// Obergrenze fuer `puffer_sekunden`
const MAX_PUFFER_SEKUNDEN: u32 = 60;

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Abtastrate der Mikrofon-Frames in Hz
    pub capture_rate: u32,
    /// Abtastrate der Modell-Antworten in Hz
    pub ausgabe_rate: u32,
    /// Samples pro ausgehendem Frame
    pub frame_groesse: usize,
    /// Groesse des Capture-Ring-Buffers in Sekunden
    pub puffer_sekunden: u32,
    /// Eingabegeraet (leer = Standard)
    pub eingabegeraet: Option<String>,
    /// Ausgabegeraet (leer = Standard)
    pub ausgabegeraet: Option<String>,
}

impl AudioEinstellungen {
    /// Kapazitaet des Capture-Ring-Buffers in Samples, None bei Ueberlauf
    ///
    /// Obergrenze sind 60 Sekunden.
    pub fn puffer_groesse(&self) -> Option<usize> {
        let sekunden = self.puffer_sekunden.max(1);
        if sekunden > MAX_PUFFER_SEKUNDEN {
            return None;
        }
        (self.capture_rate as usize).checked_mul(sekunden as usize)
    }
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            capture_rate: CAPTURE_SAMPLE_RATE,
            ausgabe_rate: OUTPUT_SAMPLE_RATE,
            frame_groesse: CAPTURE_FRAME_SIZE,
            puffer_sekunden: 2,
            eingabegeraet: None,
            ausgabegeraet: None,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl AppConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte, die serde nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiger Log-Level: {}", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format: {}", self.logging.format);
        }
        if self.verbindung.sende_queue == 0 {
            anyhow::bail!("sende_queue muss groesser 0 sein");
        }
        if self.audio.puffer_groesse().is_none() {
            anyhow::bail!(
                "puffer_sekunden zu gross: {} s bei {} Hz",
                self.audio.puffer_sekunden,
                self.audio.capture_rate
            );
        }
        self.session_config().validate()?;
        Ok(())
    }

    /// Liest den API-Schluessel aus der konfigurierten Umgebungsvariable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.verbindung.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Baut die Session-Konfiguration
    pub fn session_config(&self) -> SessionConfig {
        let audio = &self.audio;
        SessionConfig {
            setup: SessionSetup {
                model: self.session.modell.clone(),
                voice_name: self.session.stimme.clone(),
                system_instruction: self.session.systemanweisung.clone(),
                response_modality: self.session.modalitaet.clone(),
            },
            capture: CaptureConfig {
                sample_rate: audio.capture_rate,
                channels: 1,
                frame_size: audio.frame_groesse,
                buffer_size: audio.puffer_groesse().unwrap_or(audio.frame_groesse),
                device: audio.eingabegeraet.clone(),
            },
            playback: PlaybackConfig {
                sample_rate: audio.ausgabe_rate,
                channels: 1,
                device: audio.ausgabegeraet.clone(),
            },
            response_format: PcmFormat::mono(audio.ausgabe_rate),
        }
    }
}
