//! Geraete-Schnittstellen der Session
//!
//! Die Session sieht Mikrofon, Eingabe- und Ausgabekontext nur ueber diese
//! Traits. Das cpal-Backend (`engine`) implementiert sie fuer echte Hardware,
//! Tests setzen eigene Implementierungen ein.
//!
//! Lebenszyklus:
//! 1. `acquire_microphone()` – Zugriff anfragen (`ZugriffVerweigert` bei Ablehnung)
//! 2. `open_input()` / `open_output()` – Geraete-Kontexte oeffnen
//! 3. `InputContext::connect()` – Mikrofon an den Ring-Buffer haengen
//! 4. `Microphone::stop()`, `close()` der Kontexte – Freigabe, jeweils idempotent

use std::sync::Arc;

use crate::capture::{CaptureConfig, CaptureGate, CaptureWriter};
use crate::clock::OutputClock;
use crate::error::AudioResult;
use crate::playback::{CompletionSender, PlaybackConfig, PlaybackSink};

/// Freigegebener Mikrofonzugriff
pub trait Microphone: Send {
    /// Anzeigename des Geraets
    fn label(&self) -> &str;

    /// Gate zwischen Mikrofon und Ring-Buffer
    fn gate(&self) -> CaptureGate;

    /// Stoppt die Aufnahme und gibt das Geraet frei
    fn stop(&mut self) -> AudioResult<()>;
}

/// Eingabe-Kontext, haelt den Capture-Stream
pub trait InputContext: Send {
    /// Verbindet das Mikrofon mit dem Writer, ab jetzt fliessen Samples
    fn connect(&mut self, microphone: &dyn Microphone, writer: CaptureWriter) -> AudioResult<()>;

    fn close(&mut self) -> AudioResult<()>;
}

/// Ausgabe-Kontext mit Uhr und Wiedergabeziel
pub trait OutputContext: Send {
    fn clock(&self) -> Arc<dyn OutputClock>;

    fn sink(&self) -> Arc<dyn PlaybackSink>;

    fn close(&mut self) -> AudioResult<()>;
}

/// Fabrik fuer Geraete-Handles
pub trait AudioBackend: Send + Sync {
    fn acquire_microphone(&self, config: &CaptureConfig) -> AudioResult<Box<dyn Microphone>>;

    fn open_input(&self, config: &CaptureConfig) -> AudioResult<Box<dyn InputContext>>;

    /// Oeffnet die Ausgabe; natuerlich beendete Einheiten gehen an `completions`
    fn open_output(
        &self,
        config: &PlaybackConfig,
        completions: CompletionSender,
    ) -> AudioResult<Box<dyn OutputContext>>;
}
