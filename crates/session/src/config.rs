//! Session-Konfiguration
//!
//! `SessionSetup` wird beim Oeffnen unveraendert an die Gegenstelle
//! durchgereicht. `SessionConfig` fasst Setup und Geraete-Parameter zusammen.

use livetalk_audio::{CaptureConfig, PcmFormat, PlaybackConfig};
use livetalk_core::{LiveTalkError, Result};
use serde::{Deserialize, Serialize};

/// Standard-Modell fuer Live-Sessions
pub const STANDARD_MODELL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
/// Standard-Stimme
pub const STANDARD_STIMME: &str = "Puck";
/// Antwort-Modalitaet Audio
pub const MODALITAET_AUDIO: &str = "AUDIO";

/// Parameter die beim Oeffnen der Session uebertragen werden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSetup {
    pub model: String,
    pub voice_name: String,
    pub system_instruction: Option<String>,
    pub response_modality: String,
}

impl Default for SessionSetup {
    fn default() -> Self {
        Self {
            model: STANDARD_MODELL.to_string(),
            voice_name: STANDARD_STIMME.to_string(),
            system_instruction: None,
            response_modality: MODALITAET_AUDIO.to_string(),
        }
    }
}

/// Vollstaendige Konfiguration einer Session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub setup: SessionSetup,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    /// Format der Modell-Audiodaten, unabhaengig vom Ausgabegeraet
    ///
    /// Der Mixer verteilt Mono auf alle Kanaele des Geraets.
    pub response_format: PcmFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            setup: SessionSetup::default(),
            capture: CaptureConfig::default(),
            playback: PlaybackConfig::default(),
            response_format: PcmFormat::output(),
        }
    }
}

impl SessionConfig {
    /// Prueft die Werte vor dem Start einer Session
    pub fn validate(&self) -> Result<()> {
        if self.capture.sample_rate == 0
            || self.playback.sample_rate == 0
            || self.response_format.sample_rate == 0
        {
            return Err(LiveTalkError::Konfiguration(
                "Abtastrate muss groesser 0 sein".into(),
            ));
        }
        if self.capture.channels == 0
            || self.playback.channels == 0
            || self.response_format.channels == 0
        {
            return Err(LiveTalkError::Konfiguration(
                "Kanalanzahl muss groesser 0 sein".into(),
            ));
        }
        if self.capture.frame_size == 0 {
            return Err(LiveTalkError::Konfiguration(
                "Frame-Groesse muss groesser 0 sein".into(),
            ));
        }
        if self.setup.model.trim().is_empty() {
            return Err(LiveTalkError::Konfiguration("Modell fehlt".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let config = SessionConfig::default();
        assert_eq!(config.setup.voice_name, "Puck");
        assert_eq!(config.setup.response_modality, "AUDIO");
        assert!(config.setup.system_instruction.is_none());
        assert_eq!(config.capture.sample_rate, 16000);
        assert_eq!(config.capture.frame_size, 4096);
        assert_eq!(config.playback.sample_rate, 24000);
        assert_eq!(config.response_format, PcmFormat::output());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ungueltige_werte() {
        let mut config = SessionConfig::default();
        config.capture.frame_size = 0;
        assert!(matches!(
            config.validate(),
            Err(LiveTalkError::Konfiguration(_))
        ));

        let mut config = SessionConfig::default();
        config.setup.model = "  ".into();
        assert!(config.validate().is_err());
    }
}
