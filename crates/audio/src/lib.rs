//! livetalk-audio – Audio-Engine fuer Live-Sessions
//!
//! - PCM16-Codec und Base64-Transportkodierung
//! - Mikrofon-Capture via cpal mit lock-freiem Ring-Buffer
//! - Lautsprecher-Playback via cpal mit Sample-genauem Mixer
//! - Lueckenloser Playback-Scheduler mit Barge-in
//! - Geraete-Traits fuer die Session, cpal-Backend fuer echte Hardware

pub mod backend;
pub mod capture;
pub mod clock;
pub mod codec;
pub mod device;
pub mod engine;
pub mod error;
pub mod playback;
pub mod scheduler;
pub mod wire;

// Bequeme Re-Exporte der wichtigsten Typen
pub use backend::{AudioBackend, InputContext, Microphone, OutputContext};
pub use capture::{
    capture_ring, CaptureConfig, CaptureGate, CaptureReader, CaptureWriter, FrameSlicer,
    CAPTURE_FRAME_SIZE,
};
pub use clock::{ManualClock, OutputClock, SampleClock};
pub use codec::{
    decode_pcm16, encode_pcm16, AudioBuffer, EncodedPacket, PcmFormat, CAPTURE_SAMPLE_RATE,
    OUTPUT_SAMPLE_RATE,
};
pub use device::{list_devices, AudioDevice, Richtung};
pub use engine::CpalBackend;
pub use error::{AudioError, AudioResult};
pub use playback::{CompletionReceiver, CompletionSender, Mixer, PlaybackConfig, PlaybackSink, UnitId};
pub use scheduler::{PlaybackScheduler, ScheduledUnit, SchedulerStats, CURSOR_RESET};
