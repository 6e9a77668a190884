//! Barge-in: Reaktion auf Unterbrechungen durch den Benutzer

use livetalk_audio::PlaybackScheduler;
use tracing::{debug, info};

/// Ergebnis einer verarbeiteten Unterbrechung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unterbrechung {
    /// Laufende Wiedergabe wurde abgebrochen
    Abgebrochen { gestoppt: usize },
    /// Nichts lief, nur der Cursor wurde zurueckgesetzt
    Leer,
}

/// Leert das aktive Fenster und setzt den Cursor zurueck
///
/// Wiederholte Signale bei leerem Fenster aendern nichts ausser dem
/// (bereits zurueckgesetzten) Cursor.
pub fn handle_interruption(scheduler: &mut PlaybackScheduler) -> Unterbrechung {
    let gestoppt = scheduler.interrupt();
    if gestoppt == 0 {
        debug!("Unterbrechung ohne laufende Wiedergabe");
        return Unterbrechung::Leer;
    }
    info!(gestoppt, "Wiedergabe unterbrochen (Barge-in)");
    Unterbrechung::Abgebrochen { gestoppt }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livetalk_audio::{
        AudioBuffer, AudioResult, ManualClock, PcmFormat, PlaybackSink, UnitId, CURSOR_RESET,
    };
    use std::sync::Arc;

    struct Stumm;

    impl PlaybackSink for Stumm {
        fn play(&self, _unit: UnitId, _buffer: AudioBuffer, _start_at: f64) -> AudioResult<()> {
            Ok(())
        }
        fn stop(&self, _unit: UnitId) {}
        fn stop_all(&self) {}
    }

    #[test]
    fn unterbrechung_ist_idempotent() {
        let clock = Arc::new(ManualClock::new(1.0));
        let mut scheduler = PlaybackScheduler::new(clock, Arc::new(Stumm), PcmFormat::output());
        scheduler
            .schedule(AudioBuffer::mono(24000, vec![0.0; 12000]).unwrap())
            .unwrap();
        assert!(scheduler.is_speaking());

        assert_eq!(
            handle_interruption(&mut scheduler),
            Unterbrechung::Abgebrochen { gestoppt: 1 }
        );
        assert!(!scheduler.is_speaking());
        assert_eq!(scheduler.next_start_time(), CURSOR_RESET);

        assert_eq!(handle_interruption(&mut scheduler), Unterbrechung::Leer);
        assert_eq!(scheduler.stats().interruptions, 1);
    }
}
