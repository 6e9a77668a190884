//! Audio-Playback via cpal
//!
//! Der `Mixer` haelt alle geplanten Wiedergabe-Einheiten und rendert sie im
//! cpal-Callback an ihrer absoluten Startposition auf der Ausgabe-Uhr.
//! Endet eine Einheit natuerlich, meldet der Mixer ihre ID ueber einen
//! Kanal an den Scheduler zurueck. Gestoppte Einheiten werden nicht gemeldet.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::clock::{OutputClock, SampleClock};
use crate::codec::{AudioBuffer, OUTPUT_SAMPLE_RATE};
use crate::error::{AudioError, AudioResult};

/// Konfiguration fuer den Audio-Playback
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl des Geraete-Streams
    pub channels: u16,
    /// Name des Ausgabegeraets (None = Standard)
    pub device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: OUTPUT_SAMPLE_RATE,
            channels: 1,
            device: None,
        }
    }
}

/// ID einer Wiedergabe-Einheit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit:{}", self.0)
    }
}

/// Meldet natuerlich beendete Einheiten
pub type CompletionSender = mpsc::UnboundedSender<UnitId>;
/// Empfaengt natuerlich beendete Einheiten
pub type CompletionReceiver = mpsc::UnboundedReceiver<UnitId>;

/// Ziel fuer geplante Wiedergabe
pub trait PlaybackSink: Send + Sync {
    /// Plant einen Puffer fuer die absolute Startzeit `start_at` (Sekunden)
    fn play(&self, unit: UnitId, buffer: AudioBuffer, start_at: f64) -> AudioResult<()>;

    /// Stoppt eine Einheit sofort, ohne Ende-Meldung
    fn stop(&self, unit: UnitId);

    /// Stoppt alle Einheiten sofort
    fn stop_all(&self);
}

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

struct Voice {
    unit: UnitId,
    buffer: AudioBuffer,
    start_frame: u64,
    position: usize,
}

/// Mischt geplante Einheiten in den Ausgabe-Stream
pub struct Mixer {
    clock: SampleClock,
    channels: usize,
    voices: Mutex<Vec<Voice>>,
    completions: CompletionSender,
}

impl Mixer {
    pub fn new(config: &PlaybackConfig, completions: CompletionSender) -> Self {
        Self {
            clock: SampleClock::new(config.sample_rate),
            channels: config.channels.max(1) as usize,
            voices: Mutex::new(Vec::new()),
            completions,
        }
    }

    /// Uhr des Mixers, laeuft nur waehrend gerendert wird
    pub fn clock(&self) -> SampleClock {
        self.clock.clone()
    }

    /// Anzahl geplanter oder laufender Einheiten
    pub fn active(&self) -> usize {
        self.voices.lock().len()
    }

    /// Rendert einen interleavten Block und schiebt die Uhr weiter
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = out.len() / self.channels;
        let block_start = self.clock.frames();
        let block_end = block_start + frames as u64;

        let mut voices = self.voices.lock();
        for voice in voices.iter_mut() {
            let quellen = voice.buffer.channel_count();
            for f in 0..frames {
                if block_start + (f as u64) < voice.start_frame {
                    continue;
                }
                if voice.position >= voice.buffer.frames() {
                    break;
                }
                for c in 0..self.channels {
                    let quelle = voice.buffer.channel(c.min(quellen - 1));
                    out[f * self.channels + c] += quelle[voice.position];
                }
                voice.position += 1;
            }
        }

        voices.retain(|v| {
            let fertig = v.position >= v.buffer.frames() && block_end >= v.start_frame;
            if fertig {
                // Empfaenger weg heisst Session vorbei
                let _ = self.completions.send(v.unit);
            }
            !fertig
        });
        drop(voices);

        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
        self.clock.advance(frames as u64);
    }
}

impl PlaybackSink for Mixer {
    fn play(&self, unit: UnitId, buffer: AudioBuffer, start_at: f64) -> AudioResult<()> {
        if buffer.sample_rate() != self.clock.sample_rate() {
            warn!(
                unit = %unit,
                puffer = buffer.sample_rate(),
                geraet = self.clock.sample_rate(),
                "Abtastrate weicht vom Ausgabegeraet ab"
            );
        }
        let start_frame = self.clock.frame_at(start_at);
        self.voices.lock().push(Voice {
            unit,
            buffer,
            start_frame,
            position: 0,
        });
        Ok(())
    }

    fn stop(&self, unit: UnitId) {
        self.voices.lock().retain(|v| v.unit != unit);
    }

    fn stop_all(&self) {
        self.voices.lock().clear();
    }
}

impl OutputClock for Mixer {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

// ---------------------------------------------------------------------------
// cpal
// ---------------------------------------------------------------------------

/// Oeffnet einen Playback-Stream auf dem gegebenen Geraet.
///
/// Der Mixer rendert im cpal-Callback-Thread.
pub fn open_playback_stream(
    device: &Device,
    config: &PlaybackConfig,
    mixer: Arc<Mixer>,
) -> AudioResult<Stream> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err| error!("Playback-Fehler: {}", err);

    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
                && c.channels() >= config.channels
        });

    let sample_format = supported
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| mixer.render(data),
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::I16 => {
            let mut float_buf: Vec<f32> = Vec::new();
            device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _| {
                        float_buf.resize(data.len(), 0.0);
                        mixer.render(&mut float_buf);
                        for (out, s) in data.iter_mut().zip(float_buf.iter()) {
                            *out = (*s * i16::MAX as f32) as i16;
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        }
        _ => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                sample_format
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        "Playback-Stream geoeffnet: {}Hz {}ch",
        config.sample_rate, config.channels
    );

    Ok(stream)
}
