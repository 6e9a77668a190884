//! WebSocket-Transport ueber tokio-tungstenite
//!
//! Nach dem Verbindungsaufbau wird die Setup-Nachricht gesendet und der
//! Stream geteilt. Ein Writer-Task leert die begrenzte Sende-Queue, ein
//! Reader-Task uebersetzt eingehende Frames in `TransportEvent`s.
//! `send_frame` wartet nie: ist die Queue voll, wird der Frame verworfen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use livetalk_audio::EncodedPacket;
use livetalk_core::{LiveTalkError, Result};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::config::SessionSetup;
use crate::protocol::{self, Inbound};
use crate::transport::{
    Connector, FrameSender, TransportEvent, TransportHandle, Zustellung, EREIGNIS_QUEUE_GROESSE,
};

/// Standard-Endpunkt der Live-API
pub const STANDARD_ENDPUNKT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Standard-Kapazitaet der Sende-Queue in Frames
pub const SENDE_QUEUE_GROESSE: usize = 64;

/// Oeffnet Live-Sessions ueber WebSocket
#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoint: String,
    api_key: Option<String>,
    queue_size: usize,
}

impl WsConnector {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            queue_size: SENDE_QUEUE_GROESSE,
        }
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    fn url(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}?key={}", self.endpoint, key),
            None => self.endpoint.clone(),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(STANDARD_ENDPUNKT, None)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, setup: &SessionSetup) -> Result<TransportHandle> {
        info!(endpoint = %self.endpoint, model = %setup.model, "Verbinde Live-Session");

        let (mut stream, _response) = tokio_tungstenite::connect_async(self.url())
            .await
            .map_err(|e| LiveTalkError::Transport(format!("Verbindungsaufbau: {}", e)))?;

        let setup_json = protocol::to_json(&protocol::setup_message(setup))?;
        stream
            .send(Message::Text(setup_json))
            .await
            .map_err(|e| LiveTalkError::Transport(format!("Setup senden: {}", e)))?;

        let (mut ws_tx, mut ws_rx) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(self.queue_size);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(EREIGNIS_QUEUE_GROESSE);

        // Writer-Task
        let writer_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let ist_close = matches!(msg, Message::Close(_));
                if let Err(e) = ws_tx.send(msg).await {
                    if !ist_close {
                        let _ = writer_events
                            .send(TransportEvent::Error(format!("Senden fehlgeschlagen: {}", e)))
                            .await;
                    }
                    break;
                }
                if ist_close {
                    break;
                }
            }
            debug!("WebSocket Writer beendet");
        });

        // Reader-Task
        tokio::spawn(async move {
            let abschluss = loop {
                let Some(frame) = ws_rx.next().await else {
                    break TransportEvent::Close { reason: None };
                };
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    // Die Gegenstelle sendet JSON teils als Binary-Frame
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => {
                            debug!("Binary-Frame ohne UTF-8 ignoriert");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        break TransportEvent::Close {
                            reason: frame.map(|f| f.reason.to_string()),
                        };
                    }
                    Ok(_) => continue,
                    Err(e) => break TransportEvent::Error(e.to_string()),
                };

                let eingehend = match protocol::parse_server_message(&text) {
                    Ok(eingehend) => eingehend,
                    Err(e) => {
                        warn!("Server-Nachricht verworfen: {}", e);
                        continue;
                    }
                };
                for item in eingehend {
                    let event = match item {
                        Inbound::SetupComplete => TransportEvent::Open,
                        Inbound::Event(event) => TransportEvent::Message(event),
                    };
                    if event_tx.send(event).await.is_err() {
                        debug!("Session hat Ereignis-Queue geschlossen");
                        return;
                    }
                }
            };
            let _ = event_tx.send(abschluss).await;
            debug!("WebSocket Reader beendet");
        });

        let sender = Arc::new(WsFrameSender {
            tx: out_tx,
            closed: AtomicBool::new(false),
        });
        Ok(TransportHandle::new(sender, event_rx))
    }
}

/// Sendeseite einer WebSocket-Session
pub struct WsFrameSender {
    tx: mpsc::Sender<Message>,
    closed: AtomicBool,
}

impl FrameSender for WsFrameSender {
    fn send_frame(&self, packet: EncodedPacket) -> Result<Zustellung> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LiveTalkError::Transport("Kanal geschlossen".into()));
        }
        let json = protocol::to_json(&protocol::audio_message(&packet))?;
        match self.tx.try_send(Message::Text(json)) {
            Ok(()) => Ok(Zustellung::Eingereiht),
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("Sende-Queue voll, Frame verworfen");
                Ok(Zustellung::Verworfen)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(LiveTalkError::Transport("Writer beendet".into()))
            }
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Writer kann bereits beendet sein, dann ist nichts mehr zu schliessen
        let _ = self.tx.try_send(Message::Close(None));
        debug!("WebSocket-Session geschlossen");
        Ok(())
    }
}
