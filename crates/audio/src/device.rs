//! Audio-Geraete-Enumeration und -Auswahl
//!
//! Listet Ein- und Ausgabegeraete des cpal-Standard-Hosts auf und loest
//! konfigurierte Geraetenamen in cpal-Devices auf.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use tracing::{debug, warn};

use crate::error::{AudioError, AudioResult};

/// Abtastraten die fuer Live-Sessions relevant sind
const GEPRUEFTE_RATEN: [u32; 5] = [16000, 24000, 32000, 44100, 48000];

/// Richtung eines Audio-Geraets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Richtung {
    Eingabe,
    Ausgabe,
}

/// Repraesentiert ein Audio-Geraet mit seinen Eigenschaften
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Anzeigename des Geraets (dient auch als Auswahlschluessel)
    pub name: String,
    pub richtung: Richtung,
    /// Unterstuetzte Abtastraten aus `GEPRUEFTE_RATEN`
    pub sample_rates: Vec<u32>,
    /// Maximale Kanalanzahl
    pub channels: u16,
    /// Standardgeraet des Hosts
    pub is_default: bool,
}

impl AudioDevice {
    pub fn supports_rate(&self, rate: u32) -> bool {
        self.sample_rates.contains(&rate)
    }
}

/// Listet alle Geraete einer Richtung auf
pub fn list_devices(richtung: Richtung) -> AudioResult<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let devices: Vec<Device> = match richtung {
        Richtung::Eingabe => host.input_devices().map(|d| d.collect()),
        Richtung::Ausgabe => host.output_devices().map(|d| d.collect()),
    }
    .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    let standard = default_device(richtung).and_then(|d| d.name().ok());

    let mut result = Vec::new();
    for device in devices {
        match describe(&device, richtung) {
            Ok(mut ad) => {
                ad.is_default = standard.as_deref() == Some(ad.name.as_str());
                result.push(ad);
            }
            Err(e) => warn!(?richtung, "Geraet konnte nicht gelesen werden: {}", e),
        }
    }
    debug!(?richtung, "Gefundene Geraete: {}", result.len());
    Ok(result)
}

/// Laedt ein cpal-Device anhand des Namens (None = Standard)
pub fn load_cpal_device(richtung: Richtung, name: Option<&str>) -> AudioResult<Device> {
    let Some(gesucht) = name else {
        return default_device(richtung).ok_or(match richtung {
            Richtung::Eingabe => AudioError::KeinStandardEingabegeraet,
            Richtung::Ausgabe => AudioError::KeinStandardAusgabegeraet,
        });
    };

    let host = cpal::default_host();
    let devices: Vec<Device> = match richtung {
        Richtung::Eingabe => host.input_devices().map(|d| d.collect()),
        Richtung::Ausgabe => host.output_devices().map(|d| d.collect()),
    }
    .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    devices
        .into_iter()
        .find(|d| d.name().map(|n| n.contains(gesucht)).unwrap_or(false))
        .ok_or_else(|| AudioError::GeraetNichtGefunden(gesucht.to_string()))
}

fn default_device(richtung: Richtung) -> Option<Device> {
    let host = cpal::default_host();
    match richtung {
        Richtung::Eingabe => host.default_input_device(),
        Richtung::Ausgabe => host.default_output_device(),
    }
}

// Hilfsfunktion: cpal Device -> AudioDevice
fn describe(device: &Device, richtung: Richtung) -> AudioResult<AudioDevice> {
    let name = device
        .name()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    let bereiche: Vec<(u32, u32, u16)> = match richtung {
        Richtung::Eingabe => device.supported_input_configs().map(|it| {
            it.map(|c| (c.min_sample_rate().0, c.max_sample_rate().0, c.channels()))
                .collect()
        }),
        Richtung::Ausgabe => device.supported_output_configs().map(|it| {
            it.map(|c| (c.min_sample_rate().0, c.max_sample_rate().0, c.channels()))
                .collect()
        }),
    }
    .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    Ok(from_ranges(name, richtung, &bereiche))
}

fn from_ranges(name: String, richtung: Richtung, bereiche: &[(u32, u32, u16)]) -> AudioDevice {
    let mut sample_rates: Vec<u32> = GEPRUEFTE_RATEN
        .iter()
        .copied()
        .filter(|rate| bereiche.iter().any(|(min, max, _)| min <= rate && rate <= max))
        .collect();
    sample_rates.sort_unstable();

    AudioDevice {
        name,
        richtung,
        sample_rates,
        channels: bereiche.iter().map(|(_, _, c)| *c).max().unwrap_or(1),
        is_default: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raten_aus_bereichen() {
        let dev = from_ranges(
            "Test Mikrofon".into(),
            Richtung::Eingabe,
            &[(8000, 16000, 1), (44100, 48000, 2)],
        );
        assert_eq!(dev.sample_rates, vec![16000, 44100, 48000]);
        assert_eq!(dev.channels, 2);
        assert!(dev.supports_rate(16000));
        assert!(!dev.supports_rate(24000));
    }

    #[test]
    fn leere_bereiche() {
        let dev = from_ranges("Leer".into(), Richtung::Ausgabe, &[]);
        assert!(dev.sample_rates.is_empty());
        assert_eq!(dev.channels, 1);
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn eingabegeraete_auflistbar() {
        let devices = list_devices(Richtung::Eingabe).expect("Liste sollte abrufbar sein");
        println!(
            "Eingabegeraete: {:?}",
            devices.iter().map(|d| &d.name).collect::<Vec<_>>()
        );
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn ausgabegeraete_auflistbar() {
        let devices = list_devices(Richtung::Ausgabe).expect("Liste sollte abrufbar sein");
        println!(
            "Ausgabegeraete: {:?}",
            devices.iter().map(|d| &d.name).collect::<Vec<_>>()
        );
    }
}
