//! cpal-Backend – echte Audio-Hardware fuer die Session
//!
//! cpal::Stream ist !Send. Jeder Kontext besitzt deshalb einen eigenen
//! Geraete-Thread, der die Streams haelt. Steuerkommandos laufen ueber
//! crossbeam-channel, Antworten kommen ueber einen Rueckkanal.

use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::DeviceTrait;
use cpal::Stream;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::backend::{AudioBackend, InputContext, Microphone, OutputContext};
use crate::capture::{open_capture_stream, CaptureConfig, CaptureGate, CaptureWriter};
use crate::clock::OutputClock;
use crate::device::{load_cpal_device, Richtung};
use crate::error::{AudioError, AudioResult};
use crate::playback::{open_playback_stream, CompletionSender, Mixer, PlaybackConfig, PlaybackSink};

type StreamBuilder = Box<dyn FnOnce() -> AudioResult<Stream> + Send>;

/// Kommandos an einen Geraete-Thread
enum DeviceCommand {
    /// Baut einen Stream im Thread und haelt ihn bis zum Shutdown
    Build {
        build: StreamBuilder,
        reply: Sender<AudioResult<()>>,
    },
    Shutdown,
}

/// Thread der cpal-Streams besitzt
struct DeviceThread {
    name: &'static str,
    cmd_tx: Sender<DeviceCommand>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceThread {
    fn spawn(name: &'static str) -> AudioResult<Self> {
        let (cmd_tx, cmd_rx) = bounded::<DeviceCommand>(8);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || device_thread(name, cmd_rx))
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

        Ok(Self {
            name,
            cmd_tx,
            handle: Some(handle),
        })
    }

    /// Baut einen Stream im Geraete-Thread und wartet auf das Ergebnis
    fn build(&self, build: StreamBuilder) -> AudioResult<()> {
        if self.handle.is_none() {
            return Err(AudioError::KontextGeschlossen);
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx
            .send(DeviceCommand::Build {
                build,
                reply: reply_tx,
            })
            .map_err(|_| AudioError::KontextGeschlossen)?;
        reply_rx.recv().map_err(|_| AudioError::KontextGeschlossen)?
    }

    /// Beendet den Thread, alle Streams werden dabei gedroppt
    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.cmd_tx.send(DeviceCommand::Shutdown);
        if handle.join().is_err() {
            error!(thread = self.name, "Geraete-Thread ist abgestuerzt");
        }
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn device_thread(name: &'static str, cmd_rx: Receiver<DeviceCommand>) {
    let mut streams: Vec<Stream> = Vec::new();
    debug!(thread = name, "Geraete-Thread gestartet");

    loop {
        match cmd_rx.recv() {
            Ok(DeviceCommand::Build { build, reply }) => {
                let result = build().map(|stream| streams.push(stream));
                let _ = reply.send(result);
            }
            Ok(DeviceCommand::Shutdown) => break,
            Err(e) => {
                warn!(thread = name, "Geraete-Kanal getrennt: {}", e);
                break;
            }
        }
    }

    let anzahl = streams.len();
    drop(streams);
    debug!(thread = name, streams = anzahl, "Geraete-Thread beendet");
}

// ---------------------------------------------------------------------------
// Mikrofon
// ---------------------------------------------------------------------------

/// Mikrofon auf einem cpal-Eingabegeraet
pub struct CpalMicrophone {
    label: String,
    gate: CaptureGate,
    stopped: bool,
}

impl Microphone for CpalMicrophone {
    fn label(&self) -> &str {
        &self.label
    }

    fn gate(&self) -> CaptureGate {
        self.gate.clone()
    }

    fn stop(&mut self) -> AudioResult<()> {
        if !self.stopped {
            self.gate.close();
            self.stopped = true;
            debug!(mikrofon = %self.label, "Mikrofon gestoppt");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Eingabe-Kontext
// ---------------------------------------------------------------------------

/// Eingabe-Kontext mit eigenem Geraete-Thread
pub struct CpalInputContext {
    config: CaptureConfig,
    thread: DeviceThread,
}

impl InputContext for CpalInputContext {
    fn connect(&mut self, microphone: &dyn Microphone, writer: CaptureWriter) -> AudioResult<()> {
        let config = self.config.clone();
        let label = microphone.label().to_string();

        self.thread.build(Box::new(move || {
            let device = load_cpal_device(Richtung::Eingabe, Some(&label))?;
            open_capture_stream(&device, &config, writer)
        }))?;

        info!(mikrofon = %microphone.label(), "Capture-Stream verbunden");
        Ok(())
    }

    fn close(&mut self) -> AudioResult<()> {
        if self.thread.is_running() {
            self.thread.shutdown();
            debug!("Eingabe-Kontext geschlossen");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ausgabe-Kontext
// ---------------------------------------------------------------------------

/// Ausgabe-Kontext, der Mixer rendert im cpal-Callback
pub struct CpalOutputContext {
    mixer: Arc<Mixer>,
    thread: DeviceThread,
}

impl OutputContext for CpalOutputContext {
    fn clock(&self) -> Arc<dyn OutputClock> {
        self.mixer.clone()
    }

    fn sink(&self) -> Arc<dyn PlaybackSink> {
        self.mixer.clone()
    }

    fn close(&mut self) -> AudioResult<()> {
        if self.thread.is_running() {
            self.mixer.stop_all();
            self.thread.shutdown();
            debug!("Ausgabe-Kontext geschlossen");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Backend ueber den cpal-Standard-Host
#[derive(Debug, Default, Clone)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn acquire_microphone(&self, config: &CaptureConfig) -> AudioResult<Box<dyn Microphone>> {
        let device = load_cpal_device(Richtung::Eingabe, config.device.as_deref())?;
        let label = device
            .name()
            .map_err(|e| AudioError::ZugriffVerweigert(e.to_string()))?;

        // Abfrage der Konfiguration scheitert, wenn das OS den Zugriff sperrt
        device
            .default_input_config()
            .map_err(|e| AudioError::ZugriffVerweigert(format!("{}: {}", label, e)))?;

        info!(mikrofon = %label, "Mikrofonzugriff erteilt");
        Ok(Box::new(CpalMicrophone {
            label,
            gate: CaptureGate::open(),
            stopped: false,
        }))
    }

    fn open_input(&self, config: &CaptureConfig) -> AudioResult<Box<dyn InputContext>> {
        let thread = DeviceThread::spawn("livetalk-capture")?;
        Ok(Box::new(CpalInputContext {
            config: config.clone(),
            thread,
        }))
    }

    fn open_output(
        &self,
        config: &PlaybackConfig,
        completions: CompletionSender,
    ) -> AudioResult<Box<dyn OutputContext>> {
        let mixer = Arc::new(Mixer::new(config, completions));
        let thread = DeviceThread::spawn("livetalk-playback")?;

        let stream_config = config.clone();
        let stream_mixer = Arc::clone(&mixer);
        thread.build(Box::new(move || {
            let device = load_cpal_device(Richtung::Ausgabe, stream_config.device.as_deref())?;
            open_playback_stream(&device, &stream_config, stream_mixer)
        }))?;

        info!(rate = config.sample_rate, "Ausgabe-Kontext geoeffnet");
        Ok(Box::new(CpalOutputContext { mixer, thread }))
    }
}
