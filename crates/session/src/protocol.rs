//! Live-Protokoll – JSON-Nachrichten zwischen Client und Modell
//!
//! Ausgehend: `setup` beim Oeffnen, danach `realtimeInput` mit Audio-Blobs.
//! Eingehend: `setupComplete` und `serverContent` (Audio, Unterbrechung,
//! Turn-Ende). Unbekannte Felder werden ignoriert.

use livetalk_audio::{EncodedPacket, PcmFormat};
use livetalk_core::{LiveTalkError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SessionSetup;
use crate::transport::ServerEvent;

// ---------------------------------------------------------------------------
// Ausgehend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: SetupPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Audio-Blob in der Senderichtung
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
pub struct RealtimeInput {
    pub audio: Blob,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// Praefix fuer Modell-Ressourcennamen
pub const MODELL_PRAEFIX: &str = "models/";

/// Ressourcenname des Modells, `models/` wird ergaenzt falls es fehlt
pub fn modell_ressource(model: &str) -> String {
    let model = model.trim();
    if model.starts_with(MODELL_PRAEFIX) {
        model.to_string()
    } else {
        format!("{MODELL_PRAEFIX}{model}")
    }
}

/// Baut die Setup-Nachricht
///
/// Stimme, Modalitaet und Systemanweisung werden unveraendert uebernommen,
/// das Modell als Ressourcenname.
pub fn setup_message(setup: &SessionSetup) -> SetupMessage {
    SetupMessage {
        setup: SetupPayload {
            model: modell_ressource(&setup.model),
            generation_config: GenerationConfig {
                response_modalities: vec![setup.response_modality.clone()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: setup.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: setup.system_instruction.as_ref().map(|text| Content {
                parts: vec![TextPart { text: text.clone() }],
            }),
        },
    }
}

/// Verpackt ein kodiertes Paket als `realtimeInput`
pub fn audio_message(packet: &EncodedPacket) -> RealtimeInputMessage {
    RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: Blob {
                mime_type: packet.mime_type(),
                data: packet.payload().to_string(),
            },
        },
    }
}

pub fn to_json<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|e| LiveTalkError::intern(format!("Serialisierung fehlgeschlagen: {}", e)))
}

// ---------------------------------------------------------------------------
// Eingehend
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
    model_turn: Option<ModelTurn>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<Blob>,
}

/// Eingehender Frame nach dem Parsen
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Gegenstelle hat das Setup bestaetigt
    SetupComplete,
    Event(ServerEvent),
}

/// Parst eine Server-Nachricht in Ereignisse, in Reihenfolge des Auftretens
///
/// Audio-Teile ohne PCM-Deskriptor werden im Ausgabeformat angenommen.
/// Nicht-Audio-Teile (Text) werden uebersprungen.
pub fn parse_server_message(text: &str) -> Result<Vec<Inbound>> {
    let message: ServerMessage = serde_json::from_str(text)
        .map_err(|e| LiveTalkError::Dekodierung(format!("Server-Nachricht: {}", e)))?;

    let mut result = Vec::new();
    if message.setup_complete.is_some() {
        result.push(Inbound::SetupComplete);
    }

    if let Some(content) = message.server_content {
        if content.interrupted {
            result.push(Inbound::Event(ServerEvent::Interrupted));
        }
        for part in content.model_turn.into_iter().flat_map(|t| t.parts) {
            let Some(blob) = part.inline_data else {
                continue;
            };
            if !blob.mime_type.starts_with("audio/") {
                debug!(mime = %blob.mime_type, "Nicht-Audio-Daten uebersprungen");
                continue;
            }
            let format = PcmFormat::from_mime(&blob.mime_type).unwrap_or_else(PcmFormat::output);
            result.push(Inbound::Event(ServerEvent::Audio(EncodedPacket::from_wire(
                format, blob.data,
            ))));
        }
        if content.turn_complete {
            result.push(Inbound::Event(ServerEvent::TurnComplete));
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_nachricht_felder() {
        let setup = SessionSetup {
            system_instruction: Some("Sei freundlich".into()),
            ..Default::default()
        };
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&setup_message(&setup)).unwrap()).unwrap();

        let payload = &json["setup"];
        assert_eq!(
            payload["model"],
            format!("models/{}", setup.model).as_str()
        );
        assert_eq!(payload["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            payload["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "Sei freundlich");
    }

    #[test]
    fn modell_praefix_nur_einmal() {
        assert_eq!(modell_ressource("gemini-live"), "models/gemini-live");
        assert_eq!(modell_ressource("models/gemini-live"), "models/gemini-live");
        assert_eq!(modell_ressource(" gemini-live "), "models/gemini-live");

        let setup = SessionSetup {
            model: "models/eigenes-modell".into(),
            ..Default::default()
        };
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&setup_message(&setup)).unwrap()).unwrap();
        assert_eq!(json["setup"]["model"], "models/eigenes-modell");
    }

    #[test]
    fn setup_ohne_systemanweisung() {
        let json = to_json(&setup_message(&SessionSetup::default())).unwrap();
        assert!(!json.contains("systemInstruction"));
    }

    #[test]
    fn audio_nachricht() {
        let packet = EncodedPacket::from_samples(&[0.0, 0.5], PcmFormat::capture());
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&audio_message(&packet)).unwrap()).unwrap();
        assert_eq!(json["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["realtimeInput"]["audio"]["data"], packet.payload());
    }

    #[test]
    fn setup_complete_parsen() {
        let events = parse_server_message(r#"{"setupComplete": {}}"#).unwrap();
        assert_eq!(events, vec![Inbound::SetupComplete]);
    }

    #[test]
    fn unterbrechung_parsen() {
        let events = parse_server_message(r#"{"serverContent": {"interrupted": true}}"#).unwrap();
        assert_eq!(events, vec![Inbound::Event(ServerEvent::Interrupted)]);
    }

    #[test]
    fn audio_und_turn_ende_parsen() {
        let json = r#"{"serverContent": {"modelTurn": {"parts": [
            {"text": "Hallo"},
            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAD/fw=="}}
        ]}, "turnComplete": true}}"#;
        let events = parse_server_message(json).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            Inbound::Event(ServerEvent::Audio(packet)) => {
                assert_eq!(packet.format(), PcmFormat::output());
                assert_eq!(packet.payload(), "AAD/fw==");
            }
            other => panic!("Audio erwartet, war {:?}", other),
        }
        assert_eq!(events[1], Inbound::Event(ServerEvent::TurnComplete));
    }

    #[test]
    fn audio_ohne_rate_nutzt_ausgabeformat() {
        let json = r#"{"serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "audio/wav", "data": "AAA="}}
        ]}}}"#;
        let events = parse_server_message(json).unwrap();
        assert!(matches!(
            &events[0],
            Inbound::Event(ServerEvent::Audio(p)) if p.format() == PcmFormat::output()
        ));
    }

    #[test]
    fn unbekannte_nachricht_ist_leer() {
        assert!(parse_server_message(r#"{"usageMetadata": {}}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn kaputtes_json() {
        assert!(matches!(
            parse_server_message("{kein json"),
            Err(LiveTalkError::Dekodierung(_))
        ));
    }
}
