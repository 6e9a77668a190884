//! livetalk – Bibliotheks-Root
//!
//! Verdrahtet cpal-Backend, WebSocket-Transport und Session-Controller und
//! stellt die Konsolen-Steuerung bereit.

pub mod config;

use std::sync::Arc;

use anyhow::Result;
use config::AppConfig;
use livetalk_audio::{list_devices, CpalBackend, Richtung};
use livetalk_core::SessionState;
use livetalk_session::{LiveSession, WsConnector};
use tokio::sync::mpsc;

/// Konsolen-Kommando
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kommando {
    /// Mikrofon stumm schalten / aktivieren
    Stumm,
    /// Session beenden
    Beenden,
}

impl Kommando {
    pub fn parsen(zeile: &str) -> Option<Self> {
        match zeile.trim() {
            "m" | "mute" => Some(Self::Stumm),
            "q" | "quit" => Some(Self::Beenden),
            _ => None,
        }
    }
}

/// Haelt die laufende Anwendung zusammen
pub struct App {
    pub config: AppConfig,
}

impl App {
    pub fn neu(config: AppConfig) -> Self {
        Self { config }
    }

    /// Gibt alle Audio-Geraete auf stdout aus
    ///
    /// Geraete ohne die konfigurierte Abtastrate werden markiert.
    pub fn geraete_auflisten(&self) -> Result<()> {
        let audio = &self.config.audio;
        for (titel, richtung, rate) in [
            ("Eingabe", Richtung::Eingabe, audio.capture_rate),
            ("Ausgabe", Richtung::Ausgabe, audio.ausgabe_rate),
        ] {
            println!("{titel} ({rate} Hz):");
            for device in list_devices(richtung)? {
                println!(
                    "  {}{} ({} Kanaele, Raten: {:?}){}",
                    if device.is_default { "* " } else { "  " },
                    device.name,
                    device.channels,
                    device.sample_rates,
                    if device.supports_rate(rate) {
                        ""
                    } else {
                        " - Rate nicht unterstuetzt"
                    }
                );
            }
        }
        Ok(())
    }

    /// Startet eine Session und laeuft bis `q`, Ctrl-C oder Ende durch die
    /// Gegenstelle
    pub async fn starten(self) -> Result<()> {
        let api_key = self.config.api_key();
        if api_key.is_none() {
            tracing::warn!(
                env = %self.config.verbindung.api_key_env,
                "Kein API-Schluessel gesetzt"
            );
        }

        let connector = WsConnector::new(self.config.verbindung.endpunkt.clone(), api_key)
            .with_queue_size(self.config.verbindung.sende_queue);
        let mut session = LiveSession::new(
            self.config.session_config(),
            Arc::new(CpalBackend::new()),
            Arc::new(connector),
        );

        let mut zustand = session.subscribe();
        let id = session.start().await?;
        println!("Verbinde ... [m] stumm, [q] beenden");
        tracing::info!(session = %id, "Session gestartet");

        let mut kommandos = konsole_lesen();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                laeuft = session.step() => {
                    if !laeuft {
                        break;
                    }
                }
                Ok(()) = zustand.changed() => {
                    let neu = *zustand.borrow_and_update();
                    if neu == SessionState::Active {
                        println!("Verbunden, sprich los.");
                    }
                }
                kommando = kommandos.recv() => match kommando {
                    Some(Kommando::Stumm) => {
                        let stumm = session.toggle_muted();
                        println!("{}", if stumm { "Mikrofon stumm" } else { "Mikrofon aktiv" });
                    }
                    Some(Kommando::Beenden) => break,
                    // stdin geschlossen, Session laeuft bis Ctrl-C oder Ende weiter
                    None => {
                        tokio::select! {
                            _ = session.run() => {}
                            _ = &mut ctrl_c => tracing::info!("Shutdown-Signal empfangen"),
                        }
                        break;
                    }
                },
                _ = &mut ctrl_c => {
                    tracing::info!("Shutdown-Signal empfangen");
                    break;
                }
            }
        }

        session.stop();
        if let Some(fehler) = session.last_error() {
            println!("Session beendet: {fehler}");
        }
        let stats = session.stats();
        tracing::info!(
            frames_gesendet = stats.capture.frames_sent,
            pakete_eingeplant = stats.playback.scheduled,
            pakete_verworfen = stats.playback.dropped,
            unterbrechungen = stats.playback.interruptions,
            "Session beendet"
        );
        Ok(())
    }
}

/// Liest Kommandos von stdin in einem eigenen Thread
///
/// Der Thread blockiert im Lesen und wird beim Prozessende verworfen.
fn konsole_lesen() -> mpsc::UnboundedReceiver<Kommando> {
    let (tx, rx) = mpsc::unbounded_channel();
    let gestartet = std::thread::Builder::new()
        .name("livetalk-konsole".into())
        .spawn(move || {
            for zeile in std::io::stdin().lines() {
                let Ok(zeile) = zeile else { break };
                match Kommando::parsen(&zeile) {
                    Some(kommando) => {
                        if tx.send(kommando).is_err() {
                            break;
                        }
                    }
                    None => println!("Unbekanntes Kommando: {}", zeile.trim()),
                }
            }
        });
    if let Err(e) = gestartet {
        tracing::warn!("Konsolen-Thread nicht gestartet: {}", e);
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kommandos_parsen() {
        assert_eq!(Kommando::parsen("m"), Some(Kommando::Stumm));
        assert_eq!(Kommando::parsen(" q \n"), Some(Kommando::Beenden));
        assert_eq!(Kommando::parsen("quit"), Some(Kommando::Beenden));
        assert_eq!(Kommando::parsen("x"), None);
    }
}
