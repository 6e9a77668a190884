//! Capture-Pipeline – Mikrofon-Frames zum Transport
//!
//! Ein tokio-Task wartet auf Meldungen des Geraete-Callbacks, leert den
//! Ring-Buffer, schneidet Frames fester Groesse und reicht jeden Frame
//! kodiert an `FrameSender::send_frame` weiter. Der Callback selbst wartet
//! nie auf das Netzwerk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use livetalk_audio::{CaptureReader, EncodedPacket, FrameSlicer, PcmFormat};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::transport::{FrameSender, Zustellung};

/// Stummschaltung der Senderichtung
///
/// Gemutete Frames werden weiterhin erzeugt und als Stille gesendet.
#[derive(Debug, Clone, Default)]
pub struct MuteFlag(Arc<AtomicBool>);

impl MuteFlag {
    pub fn set(&self, muted: bool) {
        self.0.store(muted, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Statistiken der Capture-Pipeline (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Vom Transport eingereihte Frames
    pub frames_sent: u64,
    /// Davon als Stille gesendet
    pub frames_muted: u64,
    /// Unter Gegendruck vom Transport verworfene Frames
    pub frames_dropped: u64,
    /// Vom Transport abgelehnte Frames
    pub frames_failed: u64,
    /// Im Geraete-Callback verworfene Samples
    pub samples_dropped: u64,
}

/// Laufende Capture-Pipeline
pub struct CapturePipeline {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<CaptureStats>>,
}

impl CapturePipeline {
    /// Startet die Pipeline als tokio-Task
    pub fn spawn(
        reader: CaptureReader,
        frame_size: usize,
        format: PcmFormat,
        sender: Arc<dyn FrameSender>,
        muted: MuteFlag,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(Mutex::new(CaptureStats::default()));

        let task_stats = Arc::clone(&stats);
        let handle = tokio::spawn(async move {
            capture_loop(
                reader,
                FrameSlicer::new(frame_size),
                format,
                sender,
                muted,
                task_stats,
                shutdown_rx,
            )
            .await;
        });

        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
            stats,
        }
    }

    /// Stoppt die Pipeline sofort, es werden keine weiteren Frames gesendet
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.lock().clone()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn capture_loop(
    mut reader: CaptureReader,
    mut slicer: FrameSlicer,
    format: PcmFormat,
    sender: Arc<dyn FrameSender>,
    muted: MuteFlag,
    stats: Arc<Mutex<CaptureStats>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut buf = vec![0.0f32; slicer.frame_size()];
    let stille = vec![0.0f32; slicer.frame_size()];
    debug!(frame_size = slicer.frame_size(), "Capture-Pipeline gestartet");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = reader.ready() => {}
        }

        loop {
            let n = reader.read(&mut buf);
            if n == 0 {
                break;
            }
            for frame in slicer.push(&buf[..n]) {
                let stumm = muted.is_muted();
                let samples = if stumm { &stille } else { &frame };
                let packet = EncodedPacket::from_samples(samples, format);

                let mut s = stats.lock();
                match sender.send_frame(packet) {
                    Ok(Zustellung::Eingereiht) => {
                        s.frames_sent += 1;
                        if stumm {
                            s.frames_muted += 1;
                        }
                        trace!(frames = s.frames_sent, "Frame gesendet");
                    }
                    Ok(Zustellung::Verworfen) => {
                        s.frames_dropped += 1;
                        debug!(verworfen = s.frames_dropped, "Frame unter Gegendruck verworfen");
                    }
                    Err(e) => {
                        s.frames_failed += 1;
                        warn!("Frame nicht gesendet: {}", e);
                    }
                }
            }
        }
        let verworfen = reader.dropped();
        let mut s = stats.lock();
        if verworfen > s.samples_dropped {
            warn!(
                "Capture Ring-Buffer voll, {} Samples verworfen",
                verworfen - s.samples_dropped
            );
            s.samples_dropped = verworfen;
        }
    }

    debug!("Capture-Pipeline beendet");
}

#[cfg(test)]
mod tests {
    use super::*;
    use livetalk_audio::{capture_ring, CaptureConfig, CaptureGate};
    use livetalk_core::{LiveTalkError, Result};
    use std::time::Duration;

    #[derive(Default)]
    struct Sammler {
        frames: Mutex<Vec<EncodedPacket>>,
        ablehnen: AtomicBool,
        /// Begrenzte Queue: ab dieser Anzahl wird verworfen
        kapazitaet: Option<usize>,
    }

    impl FrameSender for Sammler {
        fn send_frame(&self, packet: EncodedPacket) -> Result<Zustellung> {
            if self.ablehnen.load(Ordering::Relaxed) {
                return Err(LiveTalkError::Transport("geschlossen".into()));
            }
            let mut frames = self.frames.lock();
            if self.kapazitaet.is_some_and(|k| frames.len() >= k) {
                return Ok(Zustellung::Verworfen);
            }
            frames.push(packet);
            Ok(Zustellung::Eingereiht)
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            frame_size: 4,
            buffer_size: 64,
            ..Default::default()
        }
    }

    async fn warten_bis(bedingung: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !bedingung() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Bedingung nicht erreicht");
    }

    #[tokio::test]
    async fn frames_in_aufnahmereihenfolge() {
        let (mut writer, reader) = capture_ring(&config(), CaptureGate::open());
        let sammler = Arc::new(Sammler::default());
        let mut pipeline = CapturePipeline::spawn(
            reader,
            4,
            PcmFormat::capture(),
            sammler.clone(),
            MuteFlag::default(),
        );

        writer.write(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        writer.write(&[0.7, 0.8]);
        warten_bis(|| sammler.frames.lock().len() == 2).await;

        let frames = sammler.frames.lock().clone();
        let erster = frames[0].decode().unwrap();
        let zweiter = frames[1].decode().unwrap();
        assert!((erster.channel(0)[0] - 0.1).abs() < 1e-3);
        assert!((zweiter.channel(0)[0] - 0.5).abs() < 1e-3);
        assert_eq!(frames[0].mime_type(), "audio/pcm;rate=16000");
        assert_eq!(pipeline.stats().frames_sent, 2);

        pipeline.stop();
    }

    #[tokio::test]
    async fn stumm_sendet_stille() {
        let (mut writer, reader) = capture_ring(&config(), CaptureGate::open());
        let sammler = Arc::new(Sammler::default());
        let muted = MuteFlag::default();
        muted.set(true);
        let pipeline = CapturePipeline::spawn(
            reader,
            4,
            PcmFormat::capture(),
            sammler.clone(),
            muted,
        );

        writer.write(&[0.9; 4]);
        warten_bis(|| sammler.frames.lock().len() == 1).await;

        let frame = sammler.frames.lock()[0].decode().unwrap();
        assert!(frame.channel(0).iter().all(|s| *s == 0.0));
        let stats = pipeline.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.frames_muted, 1);
    }

    #[tokio::test]
    async fn transportfehler_blockiert_nicht() {
        let (mut writer, reader) = capture_ring(&config(), CaptureGate::open());
        let sammler = Arc::new(Sammler::default());
        sammler.ablehnen.store(true, Ordering::Relaxed);
        let pipeline = CapturePipeline::spawn(
            reader,
            4,
            PcmFormat::capture(),
            sammler.clone(),
            MuteFlag::default(),
        );

        writer.write(&[0.1; 8]);
        warten_bis(|| pipeline.stats().frames_failed == 2).await;
        assert_eq!(pipeline.stats().frames_sent, 0);
    }

    #[tokio::test]
    async fn verworfene_frames_zaehlen_nicht_als_gesendet() {
        let (mut writer, reader) = capture_ring(&config(), CaptureGate::open());
        let sammler = Arc::new(Sammler {
            kapazitaet: Some(1),
            ..Default::default()
        });
        let pipeline = CapturePipeline::spawn(
            reader,
            4,
            PcmFormat::capture(),
            sammler.clone(),
            MuteFlag::default(),
        );

        writer.write(&[0.1; 12]);
        warten_bis(|| pipeline.stats().frames_dropped == 2).await;
        let stats = pipeline.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.frames_failed, 0);
        assert_eq!(sammler.frames.lock().len(), 1);
    }

    #[tokio::test]
    async fn ring_ueberlauf_in_statistik() {
        let config = CaptureConfig {
            frame_size: 4,
            buffer_size: 4,
            ..Default::default()
        };
        let (mut writer, reader) = capture_ring(&config, CaptureGate::open());
        // Vor dem Start voll schreiben: 4 passen, 6 werden verworfen
        assert_eq!(writer.write(&[0.1; 10]), 4);
        let sammler = Arc::new(Sammler::default());
        let pipeline = CapturePipeline::spawn(
            reader,
            4,
            PcmFormat::capture(),
            sammler.clone(),
            MuteFlag::default(),
        );

        warten_bis(|| pipeline.stats().samples_dropped == 6).await;
        assert_eq!(pipeline.stats().frames_sent, 1);
    }

    #[tokio::test]
    async fn nach_stop_keine_frames() {
        let (mut writer, reader) = capture_ring(&config(), CaptureGate::open());
        let sammler = Arc::new(Sammler::default());
        let mut pipeline = CapturePipeline::spawn(
            reader,
            4,
            PcmFormat::capture(),
            sammler.clone(),
            MuteFlag::default(),
        );

        pipeline.stop();
        pipeline.stop();
        writer.write(&[0.1; 8]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sammler.frames.lock().is_empty());
    }
}
