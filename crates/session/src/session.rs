//! Session-Controller – Lebenszyklus einer Live-Session
//!
//! ## State Machine
//! ```text
//! Idle --start()--> Connecting --Open--> Active
//!                        |                  |
//!                        +---- stop() / Close / Error ----> Closing --> Idle
//!
//! jeder Zustand --fataler Fehler--> Error --acknowledge_error()--> Idle
//! ```
//!
//! Alle Ressourcen einer laufenden Session (Transport, Mikrofon, Geraete-
//! Kontexte, Scheduler, Capture-Pipeline) liegen in einem exklusiv
//! besessenen Aggregat. Der Abbau laeuft immer in derselben Reihenfolge:
//!
//! 1. Transport schliessen
//! 2. Capture stoppen und Mikrofon freigeben
//! 3. Eingabe- und Ausgabe-Kontext schliessen
//! 4. Aktives Fenster stoppen und leeren
//!
//! Schlaegt ein Schritt fehl, wird protokolliert und weitergemacht.
//!
//! Eingehende Ereignisse werden von `step()` nacheinander verarbeitet. Nur
//! dieser Pfad schreibt Cursor und aktives Fenster.

use std::sync::Arc;

use livetalk_audio::{
    capture_ring, AudioBackend, CaptureReader, CaptureWriter, CompletionReceiver, InputContext,
    Microphone, OutputContext, PcmFormat, PlaybackScheduler, SchedulerStats, UnitId,
};
use livetalk_core::{LiveTalkError, Result, SessionId, SessionState};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::capture::{CapturePipeline, CaptureStats, MuteFlag};
use crate::config::SessionConfig;
use crate::interrupt::handle_interruption;
use crate::transport::{Connector, FrameSender, ServerEvent, TransportEvent};

/// Statistiken einer Session (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub capture: CaptureStats,
    pub playback: SchedulerStats,
}

// ---------------------------------------------------------------------------
// Ressourcen
// ---------------------------------------------------------------------------

/// Geraete-Handles einer Session, jeweils hoechstens einmal freigegeben
#[derive(Default)]
struct Geraete {
    microphone: Option<Box<dyn Microphone>>,
    input: Option<Box<dyn InputContext>>,
    output: Option<Box<dyn OutputContext>>,
}

impl Geraete {
    fn freigeben(&mut self, id: SessionId) {
        if let Some(mut mic) = self.microphone.take() {
            if let Err(e) = mic.stop() {
                warn!(session = %id, "Mikrofon freigeben fehlgeschlagen: {}", e);
            }
        }
        if let Some(mut input) = self.input.take() {
            if let Err(e) = input.close() {
                warn!(session = %id, "Eingabe-Kontext schliessen fehlgeschlagen: {}", e);
            }
        }
        if let Some(mut output) = self.output.take() {
            if let Err(e) = output.close() {
                warn!(session = %id, "Ausgabe-Kontext schliessen fehlgeschlagen: {}", e);
            }
        }
    }
}

/// Capture-Verdrahtung, die erst nach `Open` angeschlossen wird
struct WartendeAufnahme {
    writer: CaptureWriter,
    reader: CaptureReader,
}

/// Alle Ressourcen einer laufenden Session
struct LiveResources {
    id: SessionId,
    transport: Arc<dyn FrameSender>,
    events: mpsc::Receiver<TransportEvent>,
    geraete: Geraete,
    scheduler: PlaybackScheduler,
    completions: CompletionReceiver,
    wartend: Option<WartendeAufnahme>,
    capture: Option<CapturePipeline>,
}

impl LiveResources {
    fn stats(&self) -> SessionStats {
        SessionStats {
            capture: self
                .capture
                .as_ref()
                .map(CapturePipeline::stats)
                .unwrap_or_default(),
            playback: self.scheduler.stats(),
        }
    }

    /// Baut die Session in fester Reihenfolge ab
    fn teardown(mut self) -> SessionStats {
        let id = self.id;
        let stats = self.stats();

        if let Err(e) = self.transport.close() {
            warn!(session = %id, "Transport schliessen fehlgeschlagen: {}", e);
        }

        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.wartend = None;
        self.geraete.freigeben(id);

        let gestoppt = self.scheduler.flush();
        debug!(session = %id, gestoppt, "Session abgebaut");
        stats
    }
}

// ---------------------------------------------------------------------------
// LiveSession
// ---------------------------------------------------------------------------

enum Schritt {
    Transport(Option<TransportEvent>),
    Ende(UnitId),
}

/// Steuert genau eine Live-Session
pub struct LiveSession {
    config: SessionConfig,
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn Connector>,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    live: Option<LiveResources>,
    muted: MuteFlag,
    last_error: Option<String>,
    letzte_stats: SessionStats,
}

impl LiveSession {
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn AudioBackend>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            backend,
            connector,
            state: SessionState::Idle,
            state_tx,
            live: None,
            muted: MuteFlag::default(),
            last_error: None,
            letzte_stats: SessionStats::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Projektionen
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Zustand als beobachtbarer Kanal fuer Oberflaechen
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.live.as_ref().map(|live| live.id)
    }

    /// true solange Modell-Audio eingeplant ist oder laeuft
    pub fn is_speaking(&self) -> bool {
        self.live
            .as_ref()
            .map(|live| live.scheduler.is_speaking())
            .unwrap_or(false)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.is_muted()
    }

    /// Letzter Fehler, der die Session beendet hat
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Cursor des Schedulers, None ohne laufende Session
    pub fn next_start_time(&self) -> Option<f64> {
        self.live
            .as_ref()
            .map(|live| live.scheduler.next_start_time())
    }

    /// Anzahl eingeplanter oder laufender Einheiten
    pub fn active_units(&self) -> usize {
        self.live
            .as_ref()
            .map(|live| live.scheduler.active_len())
            .unwrap_or(0)
    }

    /// Statistiken der laufenden oder zuletzt beendeten Session
    pub fn stats(&self) -> SessionStats {
        self.live
            .as_ref()
            .map(LiveResources::stats)
            .unwrap_or_else(|| self.letzte_stats.clone())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Steuerung
    // -----------------------------------------------------------------------

    /// Startet eine neue Session
    ///
    /// Fordert das Mikrofon an, oeffnet beide Geraete-Kontexte und den
    /// Transport. Die Session bleibt in `Connecting` bis die Gegenstelle
    /// `Open` meldet.
    pub async fn start(&mut self) -> Result<SessionId> {
        if self.state.ist_belegt() {
            return Err(LiveTalkError::SessionBelegt(self.state));
        }
        if self.state == SessionState::Error {
            return Err(LiveTalkError::UngueltigerZustand {
                aktion: "start",
                zustand: self.state,
            });
        }
        self.config.validate()?;

        let id = SessionId::new();
        self.last_error = None;

        // Ohne Mikrofon wird `Connecting` nie erreicht
        let microphone = match self.backend.acquire_microphone(&self.config.capture) {
            Ok(mic) => mic,
            Err(e) => {
                let e = LiveTalkError::from(e);
                warn!(session = %id, "Mikrofon nicht verfuegbar: {}", e);
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        self.set_state(SessionState::Connecting);
        info!(session = %id, mikrofon = %microphone.label(), "Session wird aufgebaut");

        let mut geraete = Geraete {
            microphone: Some(microphone),
            ..Default::default()
        };

        let (completion_tx, completions) = mpsc::unbounded_channel();
        let geoeffnet = self
            .backend
            .open_input(&self.config.capture)
            .and_then(|input| {
                geraete.input = Some(input);
                self.backend
                    .open_output(&self.config.playback, completion_tx)
            });
        match geoeffnet {
            Ok(output) => geraete.output = Some(output),
            Err(e) => {
                geraete.freigeben(id);
                return Err(self.fehlschlag(id, SessionState::Error, e.into()));
            }
        }

        let handle = match self.connector.connect(&self.config.setup).await {
            Ok(handle) => handle,
            Err(e) => {
                geraete.freigeben(id);
                return Err(self.fehlschlag(id, SessionState::Idle, e));
            }
        };

        let (clock, sink) = match geraete.output.as_ref() {
            Some(output) => (output.clock(), output.sink()),
            None => {
                let _ = handle.sender.close();
                geraete.freigeben(id);
                return Err(self.fehlschlag(
                    id,
                    SessionState::Error,
                    LiveTalkError::intern("Ausgabe-Kontext fehlt"),
                ));
            }
        };

        let gate = geraete
            .microphone
            .as_ref()
            .map(|mic| mic.gate())
            .unwrap_or_else(livetalk_audio::CaptureGate::open);
        let (writer, reader) = capture_ring(&self.config.capture, gate);

        self.live = Some(LiveResources {
            id,
            transport: handle.sender,
            events: handle.events,
            geraete,
            scheduler: PlaybackScheduler::new(clock, sink, self.config.response_format),
            completions,
            wartend: Some(WartendeAufnahme { writer, reader }),
            capture: None,
        });

        debug!(session = %id, "Warte auf Bestaetigung der Gegenstelle");
        Ok(id)
    }

    /// Wartet auf das naechste Ereignis und verarbeitet es
    ///
    /// Gibt false zurueck wenn keine Session laeuft. Abbrechen zwischen
    /// zwei Ereignissen ist sicher.
    pub async fn step(&mut self) -> bool {
        let Some(live) = self.live.as_mut() else {
            return false;
        };

        let schritt = tokio::select! {
            event = live.events.recv() => Schritt::Transport(event),
            Some(unit) = live.completions.recv() => Schritt::Ende(unit),
        };

        match schritt {
            Schritt::Transport(Some(event)) => self.on_transport_event(event),
            Schritt::Transport(None) => {
                self.on_transport_event(TransportEvent::Close { reason: None })
            }
            Schritt::Ende(unit) => {
                if let Some(live) = self.live.as_mut() {
                    live.scheduler.on_unit_ended(unit);
                }
            }
        }
        true
    }

    /// Verarbeitet Ereignisse bis die Session endet
    pub async fn run(&mut self) {
        while self.step().await {}
    }

    /// Beendet die Session sofort
    ///
    /// Auf einer Session ohne Ressourcen ein No-op.
    pub fn stop(&mut self) {
        let Some(live) = self.live.take() else {
            debug!(state = ?self.state, "stop() ohne laufende Session");
            return;
        };
        let id = live.id;
        self.set_state(SessionState::Closing);
        self.letzte_stats = live.teardown();
        self.set_state(SessionState::Idle);
        info!(session = %id, "Session beendet");
    }

    /// Schaltet die Senderichtung stumm, die Aufnahme laeuft weiter
    pub fn set_muted(&mut self, muted: bool) {
        self.muted.set(muted);
        info!(muted, "Mikrofon {}", if muted { "stumm" } else { "aktiv" });
    }

    pub fn toggle_muted(&mut self) -> bool {
        let muted = !self.muted.is_muted();
        self.set_muted(muted);
        muted
    }

    /// Quittiert den Fehlerzustand
    pub fn acknowledge_error(&mut self) -> Result<()> {
        if self.state != SessionState::Error {
            return Err(LiveTalkError::UngueltigerZustand {
                aktion: "acknowledge_error",
                zustand: self.state,
            });
        }
        self.last_error = None;
        self.set_state(SessionState::Idle);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ereignisse
    // -----------------------------------------------------------------------

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(message) => self.on_message(message),
            TransportEvent::Close { reason } => {
                info!(grund = ?reason, "Gegenstelle hat die Session geschlossen");
                self.stop();
            }
            TransportEvent::Error(msg) => {
                error!("Transportfehler: {}", msg);
                self.stop();
                self.last_error = Some(LiveTalkError::Transport(msg).to_string());
            }
        }
    }

    fn on_open(&mut self) {
        if self.state != SessionState::Connecting {
            debug!(state = ?self.state, "Open ausserhalb von Connecting ignoriert");
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let Some(WartendeAufnahme { writer, reader }) = live.wartend.take() else {
            return;
        };

        let verbunden = match (live.geraete.input.as_mut(), live.geraete.microphone.as_ref()) {
            (Some(input), Some(mic)) => input.connect(mic.as_ref(), writer),
            _ => Err(livetalk_audio::AudioError::KontextGeschlossen),
        };
        if let Err(e) = verbunden {
            let id = live.id;
            self.fatal(id, e.into());
            return;
        }

        live.capture = Some(CapturePipeline::spawn(
            reader,
            self.config.capture.frame_size,
            PcmFormat::mono(self.config.capture.sample_rate),
            Arc::clone(&live.transport),
            self.muted.clone(),
        ));

        let id = live.id;
        self.set_state(SessionState::Active);
        info!(session = %id, "Session aktiv");
    }

    fn on_message(&mut self, message: ServerEvent) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        match message {
            ServerEvent::Audio(packet) => {
                if self.state != SessionState::Active {
                    debug!(state = ?self.state, "Audio ausserhalb von Active verworfen");
                    return;
                }
                match live.scheduler.enqueue(&packet) {
                    Ok(unit) => debug!(
                        unit = %unit.id,
                        start = unit.start,
                        dauer = unit.duration,
                        "Audio eingeplant"
                    ),
                    Err(e) => debug!(session = %live.id, "Audio-Paket verworfen: {}", e),
                }
            }
            ServerEvent::Interrupted => {
                handle_interruption(&mut live.scheduler);
            }
            ServerEvent::TurnComplete => debug!(session = %live.id, "Turn beendet"),
        }
    }

    // -----------------------------------------------------------------------
    // Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(von = ?self.state, nach = ?state, "Zustandswechsel");
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    /// Fehlschlag waehrend `start()`, die Geraete sind bereits freigegeben
    fn fehlschlag(&mut self, id: SessionId, ziel: SessionState, e: LiveTalkError) -> LiveTalkError {
        error!(session = %id, "Session-Aufbau fehlgeschlagen: {}", e);
        self.set_state(SessionState::Closing);
        self.last_error = Some(e.to_string());
        self.set_state(ziel);
        e
    }

    /// Fataler Fehler einer laufenden Session
    fn fatal(&mut self, id: SessionId, e: LiveTalkError) {
        error!(session = %id, "Fataler Fehler: {}", e);
        if let Some(live) = self.live.take() {
            self.set_state(SessionState::Closing);
            self.letzte_stats = live.teardown();
        }
        self.last_error = Some(e.to_string());
        self.set_state(SessionState::Error);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}
