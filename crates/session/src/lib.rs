//! livetalk-session – Duplex-Audio-Session mit einem Live-Modell
//!
//! ## Architektur
//!
//! ```text
//! Mikrofon -> CaptureWriter -> Ring-Buffer -> CapturePipeline -> FrameSender
//!                                                                   |
//!                                                              [Gegenstelle]
//!                                                                   |
//! Lautsprecher <- Mixer <- PlaybackScheduler <- LiveSession::step <- TransportEvent
//! ```
//!
//! `LiveSession` besitzt alle Ressourcen und steuert Auf- und Abbau.
//! Der Transport ist ueber `Connector`/`FrameSender` austauschbar, fuer
//! echte Verbindungen gibt es `WsConnector`.

pub mod capture;
pub mod config;
pub mod interrupt;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod ws;

// Bequeme Re-Exporte
pub use capture::{CapturePipeline, CaptureStats, MuteFlag};
pub use config::{SessionConfig, SessionSetup};
pub use interrupt::{handle_interruption, Unterbrechung};
pub use session::{LiveSession, SessionStats};
pub use transport::{
    Connector, FrameSender, ServerEvent, TransportEvent, TransportHandle, Zustellung,
};
pub use ws::WsConnector;
