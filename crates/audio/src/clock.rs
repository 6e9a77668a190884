//! Ausgabe-Uhr
//!
//! Monotone Zeitbasis des Wiedergabegeraets in Sekunden. Der Scheduler
//! berechnet daran die absoluten Startzeiten der Wiedergabe-Einheiten.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Zeitbasis eines Ausgabegeraets
pub trait OutputClock: Send + Sync {
    /// Aktuelle Zeit in Sekunden seit Oeffnen des Geraets
    fn now(&self) -> f64;
}

/// Uhr die aus der Anzahl gerenderter Frames abgeleitet wird
///
/// Der Playback-Callback zaehlt die Frames hoch, alle anderen lesen nur.
#[derive(Debug, Clone)]
pub struct SampleClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Bisher gerenderte Frames
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Wird vom Render-Callback nach jedem Block aufgerufen
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Rechnet eine Zeit in Sekunden in eine Frame-Position um
    pub fn frame_at(&self, seconds: f64) -> u64 {
        if seconds <= 0.0 {
            return 0;
        }
        (seconds * self.sample_rate as f64).round() as u64
    }
}

impl OutputClock for SampleClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Von Hand gestellte Uhr, fuer Tests und Offline-Rendering
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    jetzt: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            jetzt: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, seconds: f64) {
        *self.jetzt.lock() = seconds;
    }

    pub fn advance(&self, seconds: f64) {
        *self.jetzt.lock() += seconds;
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> f64 {
        *self.jetzt.lock()
    }
}
