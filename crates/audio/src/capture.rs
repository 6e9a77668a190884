//! Mikrofon-Capture
//!
//! Der Geraete-Callback schreibt Samples in einen lock-free Ring-Buffer und
//! weckt die Capture-Pipeline ueber ein `Notify`. Der Callback wartet nie,
//! ist der Buffer voll werden Samples verworfen.
//!
//! Der `FrameSlicer` schneidet den Sample-Strom in Frames fester Groesse,
//! unabhaengig davon in welchen Bloecken der Treiber liefert.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::codec::CAPTURE_SAMPLE_RATE;
use crate::error::{AudioError, AudioResult};

/// Frame-Groesse der Senderichtung in Samples
pub const CAPTURE_FRAME_SIZE: usize = 4096;

/// Konfiguration fuer den Audio-Capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl des Geraete-Streams (es wird nur Kanal 0 gesendet)
    pub channels: u16,
    /// Samples pro ausgehendem Frame
    pub frame_size: usize,
    /// Ring-Buffer Kapazitaet in Samples
    pub buffer_size: usize,
    /// Name des Eingabegeraets (None = Standard)
    pub device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            channels: 1,
            frame_size: CAPTURE_FRAME_SIZE,
            buffer_size: CAPTURE_SAMPLE_RATE as usize * 2, // 2 Sekunden Puffer
            device: None,
        }
    }
}

/// Produziert Samples aus dem Mikrofon-Callback
pub type CaptureProducer = HeapProd<f32>;
/// Konsumiert Samples fuer die Verarbeitung
pub type CaptureConsumer = HeapCons<f32>;

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Schalter zwischen Mikrofon und Ring-Buffer
///
/// Ist das Gate geschlossen, verwirft der Callback alles. Ein Mikrofon
/// schliesst sein Gate beim Stoppen, danach kommt kein Sample mehr an.
#[derive(Debug, Clone)]
pub struct CaptureGate(Arc<AtomicBool>);

impl CaptureGate {
    /// Neues, offenes Gate
    pub fn open() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Writer / Reader
// ---------------------------------------------------------------------------

/// Schreibseite im Geraete-Callback
pub struct CaptureWriter {
    producer: CaptureProducer,
    gate: CaptureGate,
    ready: Arc<Notify>,
    channels: usize,
    scratch: Vec<f32>,
    dropped: Arc<AtomicU64>,
}

impl CaptureWriter {
    /// Schreibt interleavte Geraete-Samples, bei mehreren Kanaelen nur Kanal 0
    ///
    /// Gibt die Anzahl uebernommener Mono-Samples zurueck.
    pub fn write(&mut self, data: &[f32]) -> usize {
        if !self.gate.is_open() {
            return 0;
        }

        if self.channels <= 1 {
            let written = self.producer.push_slice(data);
            return self.abschliessen(data.len(), written);
        }
        self.scratch.clear();
        self.scratch
            .extend(data.iter().step_by(self.channels).copied());
        self.scratch_schreiben()
    }

    /// Variante fuer Geraete die i16 liefern
    pub fn write_i16(&mut self, data: &[i16]) -> usize {
        if !self.gate.is_open() {
            return 0;
        }

        self.scratch.clear();
        self.scratch.extend(
            data.iter()
                .step_by(self.channels.max(1))
                .map(|&s| s as f32 / 32768.0),
        );
        self.scratch_schreiben()
    }

    fn scratch_schreiben(&mut self) -> usize {
        let written = self.producer.push_slice(&self.scratch);
        self.abschliessen(self.scratch.len(), written)
    }

    /// Zaehlt verworfene Samples und weckt den Reader
    ///
    /// Laeuft im Echtzeit-Callback: kein Logging, keine Allokation.
    fn abschliessen(&mut self, angeboten: usize, written: usize) -> usize {
        if written < angeboten {
            self.dropped
                .fetch_add((angeboten - written) as u64, Ordering::Relaxed);
        }
        if written > 0 {
            self.ready.notify_one();
        }
        written
    }

    pub fn gate(&self) -> &CaptureGate {
        &self.gate
    }
}

/// Leseseite fuer die Capture-Pipeline
pub struct CaptureReader {
    consumer: CaptureConsumer,
    ready: Arc<Notify>,
    dropped: Arc<AtomicU64>,
}

impl CaptureReader {
    /// Wartet bis der Callback neue Samples gemeldet hat
    pub async fn ready(&mut self) {
        self.ready.notified().await;
    }

    /// Liest verfuegbare Samples, gibt die Anzahl zurueck
    pub fn read(&mut self, buf: &mut [f32]) -> usize {
        self.consumer.pop_slice(buf)
    }

    /// Anzahl gepufferter Samples
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Im Callback verworfene Samples (Buffer voll)
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Erstellt Ring-Buffer, Writer und Reader fuer einen Capture-Stream
pub fn capture_ring(config: &CaptureConfig, gate: CaptureGate) -> (CaptureWriter, CaptureReader) {
    let rb = HeapRb::<f32>::new(config.buffer_size.max(config.frame_size));
    let (producer, consumer) = rb.split();
    let ready = Arc::new(Notify::new());
    let dropped = Arc::new(AtomicU64::new(0));

    (
        CaptureWriter {
            producer,
            gate,
            ready: Arc::clone(&ready),
            channels: config.channels.max(1) as usize,
            scratch: Vec::with_capacity(config.frame_size),
            dropped: Arc::clone(&dropped),
        },
        CaptureReader {
            consumer,
            ready,
            dropped,
        },
    )
}

// ---------------------------------------------------------------------------
// FrameSlicer
// ---------------------------------------------------------------------------

/// Schneidet einen Sample-Strom in Frames fester Groesse
#[derive(Debug)]
pub struct FrameSlicer {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameSlicer {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Haengt Samples an und gibt alle vollstaendigen Frames in Reihenfolge zurueck
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            frames.push(self.pending.drain(..self.frame_size).collect());
        }
        frames
    }

    /// Samples die noch auf einen vollen Frame warten
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// cpal
// ---------------------------------------------------------------------------

/// Oeffnet einen Capture-Stream auf dem gegebenen Geraet.
///
/// Der Writer laeuft im cpal-Callback-Thread. Der Stream muss in dem Thread
/// bleiben, der ihn erzeugt hat (cpal::Stream ist !Send).
pub fn open_capture_stream(
    device: &Device,
    config: &CaptureConfig,
    mut writer: CaptureWriter,
) -> AudioResult<Stream> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err| error!("Capture-Fehler: {}", err);

    // Unterstuetzte Sample-Formate pruefen
    let supported = device
        .supported_input_configs()
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
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    writer.write(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    writer.write_i16(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
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
        "Capture-Stream geoeffnet: {}Hz {}ch",
        config.sample_rate, config.channels
    );

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.frame_size, 4096);
        assert!(config.buffer_size >= config.frame_size);
    }

    #[test]
    fn slicer_liefert_volle_frames() {
        let mut slicer = FrameSlicer::new(4);
        assert!(slicer.push(&[0.1, 0.2, 0.3]).is_empty());
        let frames = slicer.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(frames[1], vec![0.5, 0.6, 0.7, 0.8]);
        assert_eq!(slicer.pending(), 1);
    }

    #[test]
    fn writer_und_reader() {
        let config = CaptureConfig {
            buffer_size: 16,
            frame_size: 4,
            ..Default::default()
        };
        let (mut writer, mut reader) = capture_ring(&config, CaptureGate::open());
        assert_eq!(writer.write(&[0.5; 6]), 6);
        assert_eq!(reader.available(), 6);

        let mut buf = [0.0f32; 8];
        assert_eq!(reader.read(&mut buf), 6);
        assert_eq!(&buf[..6], &[0.5; 6]);
    }

    #[test]
    fn geschlossenes_gate_verwirft() {
        let gate = CaptureGate::open();
        let (mut writer, reader) = capture_ring(&CaptureConfig::default(), gate.clone());
        gate.close();
        assert_eq!(writer.write(&[0.5; 32]), 0);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn voller_buffer_zaehlt_verworfene() {
        let config = CaptureConfig {
            buffer_size: 8,
            frame_size: 8,
            ..Default::default()
        };
        let (mut writer, reader) = capture_ring(&config, CaptureGate::open());
        assert_eq!(writer.write(&[0.1; 12]), 8);
        assert_eq!(reader.dropped(), 4);
    }

    #[test]
    fn stereo_wird_auf_kanal_null_reduziert() {
        let config = CaptureConfig {
            channels: 2,
            ..Default::default()
        };
        let (mut writer, mut reader) = capture_ring(&config, CaptureGate::open());
        assert_eq!(writer.write(&[0.1, 0.9, 0.2, 0.9, 0.3, 0.9]), 3);
        let mut buf = [0.0f32; 3];
        reader.read(&mut buf);
        assert_eq!(buf, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn i16_stereo_wird_skaliert_und_reduziert() {
        let config = CaptureConfig {
            channels: 2,
            ..Default::default()
        };
        let (mut writer, mut reader) = capture_ring(&config, CaptureGate::open());
        assert_eq!(writer.write_i16(&[16384, 1, -16384, 1, 0, 1]), 3);
        let mut buf = [1.0f32; 3];
        assert_eq!(reader.read(&mut buf), 3);
        assert_eq!(buf, [0.5, -0.5, 0.0]);

        // Scratch-Puffer wird wiederverwendet, keine Reste des letzten Aufrufs
        assert_eq!(writer.write_i16(&[8192, 1]), 1);
        assert_eq!(reader.read(&mut buf), 1);
        assert_eq!(buf[0], 0.25);
    }

    #[test]
    fn i16_bei_geschlossenem_gate_verworfen() {
        let gate = CaptureGate::open();
        let (mut writer, reader) = capture_ring(&CaptureConfig::default(), gate.clone());
        gate.close();
        assert_eq!(writer.write_i16(&[1000; 8]), 0);
        assert_eq!(reader.available(), 0);
        assert_eq!(reader.dropped(), 0);
    }

    #[tokio::test]
    async fn reader_wird_geweckt() {
        let (mut writer, mut reader) =
            capture_ring(&CaptureConfig::default(), CaptureGate::open());
        writer.write(&[0.2; 10]);
        // Permit ist gespeichert, ready() kehrt sofort zurueck
        tokio::time::timeout(std::time::Duration::from_secs(1), reader.ready())
            .await
            .expect("Reader sollte geweckt werden");
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn capture_stream_oeffnen() {
        use cpal::traits::HostTrait;
        let host = cpal::default_host();
        if let Some(device) = host.default_input_device() {
            let config = CaptureConfig::default();
            let (writer, _reader) = capture_ring(&config, CaptureGate::open());
            let result = open_capture_stream(&device, &config, writer);
            assert!(result.is_ok(), "Capture-Stream sollte oeffenbar sein");
        }
    }
}
