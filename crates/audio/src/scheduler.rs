//! Playback-Scheduler – lueckenlose Wiedergabe eingehender Pakete
//!
//! Jedes Paket wird dekodiert und auf der Ausgabe-Uhr bei
//! `max(jetzt, next_start_time)` eingeplant, danach rueckt der Cursor um die
//! Dauer des Pakets vor. So schliessen aufeinanderfolgende Pakete direkt
//! aneinander an, ohne Luecke und ohne Ueberlappung.
//!
//! Alle geplanten oder laufenden Einheiten bilden das aktive Fenster. Bei
//! einer Unterbrechung (Barge-in) werden alle Einheiten sofort gestoppt, das
//! Fenster geleert und der Cursor zurueckgesetzt.
//!
//! Der Scheduler hat genau einen Schreiber: die Session-Schleife, die Pakete
//! in Ankunftsreihenfolge abarbeitet. Cursor und Fenster brauchen deshalb
//! keine eigene Synchronisation.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::clock::OutputClock;
use crate::codec::{AudioBuffer, EncodedPacket, PcmFormat};
use crate::error::AudioResult;
use crate::playback::{PlaybackSink, UnitId};

/// Wert des Cursors nach Unterbrechung oder neuem Session-Start
pub const CURSOR_RESET: f64 = 0.0;

/// Zeitplan einer Wiedergabe-Einheit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledUnit {
    pub id: UnitId,
    /// Startzeit auf der Ausgabe-Uhr (Sekunden)
    pub start: f64,
    /// Dauer in Sekunden
    pub duration: f64,
}

impl ScheduledUnit {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Statistiken des Schedulers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Eingeplante Einheiten gesamt
    pub scheduled: u64,
    /// Natuerlich beendete Einheiten
    pub ended: u64,
    /// Verworfene Pakete (nicht dekodierbar)
    pub dropped: u64,
    /// Verarbeitete Unterbrechungen mit nicht-leerem Fenster
    pub interruptions: u64,
    /// Durch Unterbrechung oder Teardown gestoppte Einheiten
    pub stopped_units: u64,
}

/// Plant dekodierte Pakete lueckenlos auf der Ausgabe-Uhr ein
pub struct PlaybackScheduler {
    clock: Arc<dyn OutputClock>,
    sink: Arc<dyn PlaybackSink>,
    format: PcmFormat,
    next_start_time: f64,
    window: BTreeMap<UnitId, ScheduledUnit>,
    next_unit: u64,
    /// "Agent spricht", gesetzt solange das aktive Fenster nicht leer ist
    speaking: bool,
    stats: SchedulerStats,
}

impl PlaybackScheduler {
    /// Erstellt einen Scheduler; eingehende Pakete werden im Format `format`
    /// dekodiert
    pub fn new(clock: Arc<dyn OutputClock>, sink: Arc<dyn PlaybackSink>, format: PcmFormat) -> Self {
        Self {
            clock,
            sink,
            format,
            next_start_time: CURSOR_RESET,
            window: BTreeMap::new(),
            next_unit: 0,
            speaking: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Dekodiert ein Paket und plant es ein
    ///
    /// Schlaegt die Dekodierung fehl, bleiben Cursor und Fenster unveraendert.
    pub fn enqueue(&mut self, packet: &EncodedPacket) -> AudioResult<ScheduledUnit> {
        let buffer = match packet.decode_as(self.format) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.stats.dropped += 1;
                return Err(e);
            }
        };
        self.schedule(buffer)
    }

    /// Plant einen bereits dekodierten Puffer ein
    pub fn schedule(&mut self, buffer: AudioBuffer) -> AudioResult<ScheduledUnit> {
        let start = self.clock.now().max(self.next_start_time);
        let duration = buffer.duration();
        let id = UnitId(self.next_unit);

        self.sink.play(id, buffer, start)?;

        self.next_unit += 1;
        self.next_start_time = start + duration;

        let unit = ScheduledUnit {
            id,
            start,
            duration,
        };
        self.window.insert(id, unit);
        self.speaking = true;
        self.stats.scheduled += 1;

        trace!(
            unit = %id,
            start,
            duration,
            aktiv = self.window.len(),
            "Einheit eingeplant"
        );
        Ok(unit)
    }

    /// Verarbeitet das natuerliche Ende einer Einheit
    ///
    /// Gibt false zurueck wenn die Einheit nicht (mehr) im Fenster war,
    /// etwa weil sie bereits gestoppt wurde.
    pub fn on_unit_ended(&mut self, id: UnitId) -> bool {
        if self.window.remove(&id).is_none() {
            return false;
        }
        self.stats.ended += 1;
        if self.window.is_empty() {
            self.speaking = false;
            debug!("Wiedergabe beendet, aktives Fenster leer");
        }
        true
    }

    /// Stoppt alle Einheiten, leert das Fenster und setzt den Cursor zurueck
    ///
    /// Gibt die Anzahl gestoppter Einheiten zurueck.
    pub fn flush(&mut self) -> usize {
        let gestoppt = self.window.len();
        for id in self.window.keys() {
            self.sink.stop(*id);
        }
        self.window.clear();
        self.next_start_time = CURSOR_RESET;
        self.speaking = false;
        self.stats.stopped_units += gestoppt as u64;
        gestoppt
    }

    /// Barge-in: wie `flush`, zaehlt aber als Unterbrechung
    pub fn interrupt(&mut self) -> usize {
        let gestoppt = self.flush();
        if gestoppt > 0 {
            self.stats.interruptions += 1;
        }
        gestoppt
    }

    /// Startzeit der naechsten Einheit
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Anzahl Einheiten im aktiven Fenster
    pub fn active_len(&self) -> usize {
        self.window.len()
    }

    /// Einheiten im aktiven Fenster, nach ID (= Ankunft) sortiert
    pub fn active_units(&self) -> impl Iterator<Item = &ScheduledUnit> {
        self.window.values()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::AudioError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Aufzeichnung {
        gespielt: Mutex<Vec<(UnitId, f64)>>,
        gestoppt: Mutex<Vec<UnitId>>,
    }

    impl PlaybackSink for Aufzeichnung {
        fn play(&self, unit: UnitId, _buffer: AudioBuffer, start_at: f64) -> AudioResult<()> {
            self.gespielt.lock().push((unit, start_at));
            Ok(())
        }
        fn stop(&self, unit: UnitId) {
            self.gestoppt.lock().push(unit);
        }
        fn stop_all(&self) {}
    }

    fn scheduler(clock: &ManualClock) -> (PlaybackScheduler, Arc<Aufzeichnung>) {
        let sink = Arc::new(Aufzeichnung::default());
        let s = PlaybackScheduler::new(
            Arc::new(clock.clone()),
            sink.clone(),
            PcmFormat::output(),
        );
        (s, sink)
    }

    /// Paket mit `sekunden` Dauer bei 24 kHz
    fn paket(sekunden: f64) -> EncodedPacket {
        let samples = vec![0.1f32; (sekunden * 24000.0).round() as usize];
        EncodedPacket::from_samples(&samples, PcmFormat::output())
    }

    #[test]
    fn drei_pakete_lueckenlos() {
        let clock = ManualClock::new(3.0);
        let (mut s, sink) = scheduler(&clock);

        let a = s.enqueue(&paket(0.5)).unwrap();
        let b = s.enqueue(&paket(0.5)).unwrap();
        let c = s.enqueue(&paket(0.5)).unwrap();

        assert!((a.start - 3.0).abs() < 1e-9);
        assert!((b.start - 3.5).abs() < 1e-9);
        assert!((c.start - 4.0).abs() < 1e-9);
        assert!((s.next_start_time() - 4.5).abs() < 1e-9);
        assert_eq!(s.active_len(), 3);
        assert!(s.is_speaking());
        assert_eq!(sink.gespielt.lock().len(), 3);
    }

    #[test]
    fn keine_ueberlappung_bei_wechselnden_dauern() {
        let clock = ManualClock::new(0.0);
        let (mut s, _sink) = scheduler(&clock);

        let dauern = [0.02, 0.3, 0.125, 0.5, 0.04, 1.0, 0.2, 0.01];
        let mut vorher: Option<ScheduledUnit> = None;
        for (i, d) in dauern.iter().enumerate() {
            // Uhr laeuft unregelmaessig weiter, teils schneller als der Cursor
            clock.advance(if i % 3 == 0 { 0.6 } else { 0.01 });
            let unit = s.enqueue(&paket(*d)).unwrap();
            if let Some(p) = vorher {
                assert!(unit.start >= p.start);
                assert!(unit.start >= p.end() - 1e-9, "Ueberlappung bei {i}");
            }
            assert!(unit.start >= clock.now() - 1e-9);
            vorher = Some(unit);
        }
    }

    #[test]
    fn cursor_hinter_der_uhr_wird_nachgezogen() {
        let clock = ManualClock::new(0.0);
        let (mut s, _sink) = scheduler(&clock);
        s.enqueue(&paket(0.1)).unwrap();
        clock.set(5.0);
        let unit = s.enqueue(&paket(0.1)).unwrap();
        assert!((unit.start - 5.0).abs() < 1e-9);
    }

    #[test]
    fn unterbrechung_leert_fenster() {
        let clock = ManualClock::new(1.0);
        let (mut s, sink) = scheduler(&clock);
        s.enqueue(&paket(0.5)).unwrap();
        s.enqueue(&paket(0.5)).unwrap();

        assert_eq!(s.interrupt(), 2);
        assert_eq!(s.active_len(), 0);
        assert_eq!(s.next_start_time(), CURSOR_RESET);
        assert!(!s.is_speaking());
        assert_eq!(sink.gestoppt.lock().len(), 2);

        // Naechstes Paket startet an der aktuellen Uhrzeit
        clock.set(1.2);
        let neu = s.enqueue(&paket(0.5)).unwrap();
        assert!((neu.start - 1.2).abs() < 1e-9);
    }

    #[test]
    fn wiederholte_unterbrechung_ist_noop() {
        let clock = ManualClock::new(0.0);
        let (mut s, sink) = scheduler(&clock);
        s.enqueue(&paket(0.2)).unwrap();
        s.interrupt();
        assert_eq!(s.interrupt(), 0);
        assert_eq!(s.stats().interruptions, 1);
        assert_eq!(sink.gestoppt.lock().len(), 1);
    }

    #[test]
    fn natuerliches_ende_loescht_anzeige() {
        let clock = ManualClock::new(0.0);
        let (mut s, _sink) = scheduler(&clock);
        let a = s.enqueue(&paket(0.1)).unwrap();
        let b = s.enqueue(&paket(0.1)).unwrap();

        assert!(s.on_unit_ended(a.id));
        assert!(s.is_speaking(), "b laeuft noch");
        assert!(s.on_unit_ended(b.id));
        assert!(!s.is_speaking());
        assert!(!s.on_unit_ended(b.id), "doppeltes Ende wird ignoriert");
        assert_eq!(s.stats().ended, 2);
    }

    #[test]
    fn ende_nach_unterbrechung_wird_ignoriert() {
        let clock = ManualClock::new(0.0);
        let (mut s, _sink) = scheduler(&clock);
        let a = s.enqueue(&paket(0.1)).unwrap();
        s.interrupt();
        let b = s.enqueue(&paket(0.1)).unwrap();
        assert!(!s.on_unit_ended(a.id));
        assert!(s.is_speaking());
        assert_eq!(s.active_units().next().map(|u| u.id), Some(b.id));
    }

    #[test]
    fn kaputtes_paket_aendert_cursor_nicht() {
        let clock = ManualClock::new(0.0);
        let (mut s, _sink) = scheduler(&clock);
        s.enqueue(&paket(0.5)).unwrap();
        let cursor = s.next_start_time();

        // 3 Samples bei Stereo-Format
        let mut stereo = PlaybackScheduler::new(
            Arc::new(clock.clone()),
            Arc::new(Aufzeichnung::default()),
            PcmFormat {
                sample_rate: 24000,
                channels: 2,
            },
        );
        let ungerade = EncodedPacket::from_samples(&[0.1, 0.2, 0.3], PcmFormat::output());
        assert!(matches!(
            stereo.enqueue(&ungerade),
            Err(AudioError::FormatFehler(_))
        ));
        assert_eq!(stereo.next_start_time(), CURSOR_RESET);
        assert_eq!(stereo.stats().dropped, 1);

        let kaputt = EncodedPacket::from_wire(PcmFormat::output(), "***");
        assert!(s.enqueue(&kaputt).is_err());
        assert_eq!(s.next_start_time(), cursor);
        assert_eq!(s.active_len(), 1);
    }
}
