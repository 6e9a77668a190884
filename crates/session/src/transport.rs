//! Transport-Schnittstelle zur Gegenstelle
//!
//! Die Session kennt den Streaming-Kanal nur ueber drei Faehigkeiten:
//! Frames senden, schliessen und Ereignisse empfangen. Konkrete
//! Implementierungen (WebSocket, Test-Fakes) liefert ein `Connector`.

use std::sync::Arc;

use async_trait::async_trait;
use livetalk_audio::EncodedPacket;
use livetalk_core::Result;
use tokio::sync::mpsc;

use crate::config::SessionSetup;

/// Kapazitaet der Ereignis-Queue zwischen Transport und Session
pub const EREIGNIS_QUEUE_GROESSE: usize = 256;

/// Ergebnis von `FrameSender::send_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    /// Frame ist zum Senden eingereiht
    Eingereiht,
    /// Sende-Queue voll, der Frame wurde verworfen
    Verworfen,
}

/// Sendeseite des Transports
pub trait FrameSender: Send + Sync {
    /// Reiht einen Audio-Frame zum Senden ein, ohne auf das Netzwerk zu warten
    ///
    /// Unter Gegendruck darf der Frame verworfen werden, das ist kein Fehler.
    /// Ein `Err` bedeutet, dass der Kanal nicht mehr sendet.
    fn send_frame(&self, packet: EncodedPacket) -> Result<Zustellung>;

    /// Schliesst den Kanal; wiederholte Aufrufe sind No-ops
    fn close(&self) -> Result<()>;
}

/// Inhalt einer Server-Nachricht
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Audio-Chunk des Modells
    Audio(EncodedPacket),
    /// Benutzer hat das Modell unterbrochen (Barge-in)
    Interrupted,
    /// Modell hat seinen Turn beendet
    TurnComplete,
}

/// Benachrichtigungen des Transports an die Session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Gegenstelle ist bereit
    Open,
    Message(ServerEvent),
    /// Kanal wurde geschlossen
    Close { reason: Option<String> },
    /// Kanal meldet einen Fehler
    Error(String),
}

/// Geoeffneter Transport
pub struct TransportHandle {
    pub sender: Arc<dyn FrameSender>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl TransportHandle {
    pub fn new(sender: Arc<dyn FrameSender>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self { sender, events }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

/// Oeffnet Transport-Kanaele
#[async_trait]
pub trait Connector: Send + Sync {
    /// Oeffnet den Kanal und uebertraegt `setup` unveraendert
    ///
    /// Das `Open`-Ereignis folgt erst, wenn die Gegenstelle bereit ist.
    async fn connect(&self, setup: &SessionSetup) -> Result<TransportHandle>;
}
