//! PCM-Codec: f32-Samples <-> 16-Bit-PCM
//!
//! Zustandslose Konvertierung zwischen normalisierten Samples (-1.0..1.0)
//! und dem Wire-Format der Live-Verbindung: vorzeichenbehaftete 16-Bit
//! Integer, Little-Endian, bei mehreren Kanaelen interleaved.
//!
//! Werte ausserhalb von -1.0..1.0 werden beim Kodieren auf den i16-Bereich
//! begrenzt (Saettigung), nicht umgebrochen.

use tracing::debug;

use crate::error::{AudioError, AudioResult};
use crate::wire;

/// Skalierungsfaktor zwischen normalisierten Samples und i16
pub const PCM_SKALIERUNG: f32 = 32768.0;

/// Abtastrate des Mikrofons (Senderichtung)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;
/// Abtastrate der Modell-Antworten (Empfangsrichtung)
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Format-Deskriptor fuer PCM-Daten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl (1 = Mono)
    pub channels: u16,
}

impl PcmFormat {
    /// Mono-Format mit gegebener Abtastrate
    pub const fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    /// Format der Mikrofon-Frames (16 kHz Mono)
    pub const fn capture() -> Self {
        Self::mono(CAPTURE_SAMPLE_RATE)
    }

    /// Format der Modell-Audiodaten (24 kHz Mono)
    pub const fn output() -> Self {
        Self::mono(OUTPUT_SAMPLE_RATE)
    }

    /// MIME-Deskriptor, z.B. `audio/pcm;rate=16000`
    pub fn mime_type(&self) -> String {
        if self.channels == 1 {
            format!("audio/pcm;rate={}", self.sample_rate)
        } else {
            format!(
                "audio/pcm;rate={};channels={}",
                self.sample_rate, self.channels
            )
        }
    }

    /// Liest einen MIME-Deskriptor. Gibt None zurueck wenn es kein PCM ist
    /// oder die Rate fehlt.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mut teile = mime.split(';').map(str::trim);
        let basis = teile.next()?;
        if !basis.eq_ignore_ascii_case("audio/pcm") {
            return None;
        }

        let mut sample_rate = None;
        let mut channels = 1u16;
        for param in teile {
            match param.split_once('=') {
                Some(("rate", wert)) => sample_rate = wert.trim().parse().ok(),
                Some(("channels", wert)) => channels = wert.trim().parse().ok()?,
                _ => {}
            }
        }

        let sample_rate = sample_rate.filter(|r| *r > 0)?;
        (channels > 0).then_some(Self {
            sample_rate,
            channels,
        })
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::capture()
    }
}

// ---------------------------------------------------------------------------
// Dekodierter Puffer
// ---------------------------------------------------------------------------

/// Dekodierter Audio-Puffer, pro Kanal ein Sample-Vektor
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Erstellt einen Puffer aus bereits getrennten Kanaelen
    ///
    /// Alle Kanaele muessen gleich lang sein.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> AudioResult<Self> {
        if sample_rate == 0 {
            return Err(AudioError::FormatFehler("Abtastrate 0".into()));
        }
        if channels.is_empty() {
            return Err(AudioError::FormatFehler("keine Kanaele".into()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(AudioError::FormatFehler(
                "Kanaele unterschiedlich lang".into(),
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Mono-Puffer
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> AudioResult<Self> {
        Self::new(sample_rate, vec![samples])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Anzahl Frames (Samples pro Kanal)
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Samples eines Kanals
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Wiedergabedauer in Sekunden
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

// ---------------------------------------------------------------------------
// Kodieren / Dekodieren
// ---------------------------------------------------------------------------

/// Konvertiert ein normalisiertes Sample nach i16 (`round(s * 32768)`, begrenzt)
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample * PCM_SKALIERUNG)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Kodiert Samples zu 16-Bit-PCM (Little-Endian)
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&sample_to_i16(s).to_le_bytes());
    }
    bytes
}

/// Dekodiert 16-Bit-PCM zu einem normalisierten Puffer und trennt die Kanaele
///
/// Ein einzelnes ueberzaehliges Byte am Ende wird verworfen. Passt die
/// Sample-Anzahl nicht zur Kanalanzahl, schlaegt die Dekodierung mit
/// `FormatFehler` fehl.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channel_count: u16) -> AudioResult<AudioBuffer> {
    if channel_count == 0 {
        return Err(AudioError::FormatFehler("Kanalanzahl 0".into()));
    }
    if sample_rate == 0 {
        return Err(AudioError::FormatFehler("Abtastrate 0".into()));
    }

    if bytes.len() % 2 != 0 {
        debug!(laenge = bytes.len(), "Ungerade PCM-Laenge, letztes Byte verworfen");
    }
    let sample_count = bytes.len() / 2;
    let kanaele = channel_count as usize;
    if sample_count % kanaele != 0 {
        return Err(AudioError::FormatFehler(format!(
            "{} Samples nicht durch {} Kanaele teilbar",
            sample_count, kanaele
        )));
    }

    let frames = sample_count / kanaele;
    let mut channels = vec![Vec::with_capacity(frames); kanaele];
    for (i, paar) in bytes.chunks_exact(2).enumerate() {
        let wert = i16::from_le_bytes([paar[0], paar[1]]);
        channels[i % kanaele].push(wert as f32 / PCM_SKALIERUNG);
    }

    AudioBuffer::new(sample_rate, channels)
}

// ---------------------------------------------------------------------------
// EncodedPacket
// ---------------------------------------------------------------------------

/// PCM-Daten in Transport-Kodierung mit Format-Deskriptor
///
/// Unveraenderlich nach der Erstellung.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    format: PcmFormat,
    payload: String,
}

impl EncodedPacket {
    /// Kodiert einen Frame fuer die Senderichtung
    pub fn from_samples(samples: &[f32], format: PcmFormat) -> Self {
        Self {
            format,
            payload: wire::to_wire(&encode_pcm16(samples)),
        }
    }

    /// Uebernimmt ein bereits kodiertes Paket aus der Empfangsrichtung
    pub fn from_wire(format: PcmFormat, payload: impl Into<String>) -> Self {
        Self {
            format,
            payload: payload.into(),
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Text-kodierte Nutzdaten
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn mime_type(&self) -> String {
        self.format.mime_type()
    }

    /// Dekodiert das Paket mit seinem eigenen Format
    pub fn decode(&self) -> AudioResult<AudioBuffer> {
        self.decode_as(self.format)
    }

    /// Dekodiert das Paket mit einem vorgegebenen Format
    pub fn decode_as(&self, format: PcmFormat) -> AudioResult<AudioBuffer> {
        let bytes = wire::from_wire(&self.payload)?;
        decode_pcm16(&bytes, format.sample_rate, format.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bekannte_werte_kodieren() {
        let bytes = encode_pcm16(&[0.0, 0.5, -0.5]);
        // 0.5 * 32768 = 16384 = 0x4000
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x40, 0x00, 0xC0]);
    }

    #[test]
    fn grenzwerte_werden_begrenzt() {
        assert_eq!(sample_to_i16(1.0), i16::MAX);
        assert_eq!(sample_to_i16(-1.0), i16::MIN);
        assert_eq!(sample_to_i16(3.5), i16::MAX, "Ueberlauf saettigt statt umzubrechen");
        assert_eq!(sample_to_i16(-7.0), i16::MIN);
    }

    #[test]
    fn roundtrip_innerhalb_quantisierung() {
        let samples: Vec<f32> = (0..4096)
            .map(|i| ((i as f32) / 4096.0 * std::f32::consts::TAU * 3.0).sin() * 0.9)
            .collect();
        let decoded = decode_pcm16(&encode_pcm16(&samples), 16000, 1).unwrap();
        assert_eq!(decoded.frames(), samples.len());
        for (a, b) in samples.iter().zip(decoded.channel(0)) {
            assert!((a - b).abs() <= 1.0 / PCM_SKALIERUNG, "{a} vs {b}");
        }
    }

    #[test]
    fn stereo_wird_getrennt() {
        let bytes = encode_pcm16(&[0.25, -0.25, 0.5, -0.5]);
        let buffer = decode_pcm16(&bytes, 24000, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0), &[0.25, 0.5]);
        assert_eq!(buffer.channel(1), &[-0.25, -0.5]);
    }

    #[test]
    fn kanal_laenge_passt_nicht() {
        // 3 Samples bei 2 Kanaelen
        let bytes = encode_pcm16(&[0.1, 0.2, 0.3]);
        let result = decode_pcm16(&bytes, 24000, 2);
        assert!(matches!(result, Err(AudioError::FormatFehler(_))));
    }

    #[test]
    fn ungerades_byte_wird_verworfen() {
        let mut bytes = encode_pcm16(&[0.5, 0.5]);
        bytes.push(0x7f);
        let buffer = decode_pcm16(&bytes, 24000, 1).unwrap();
        assert_eq!(buffer.frames(), 2);
    }

    #[test]
    fn kanalanzahl_null_ist_fehler() {
        assert!(decode_pcm16(&[0, 0], 24000, 0).is_err());
    }

    #[test]
    fn dauer_aus_frames() {
        let buffer = AudioBuffer::mono(24000, vec![0.0; 12000]).unwrap();
        assert!((buffer.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mime_typ_format() {
        assert_eq!(PcmFormat::capture().mime_type(), "audio/pcm;rate=16000");
        assert_eq!(
            PcmFormat::from_mime("audio/pcm;rate=24000"),
            Some(PcmFormat::output())
        );
        assert_eq!(
            PcmFormat::from_mime("audio/pcm; rate=48000; channels=2"),
            Some(PcmFormat {
                sample_rate: 48000,
                channels: 2
            })
        );
        assert_eq!(PcmFormat::from_mime("audio/opus;rate=48000"), None);
        assert_eq!(PcmFormat::from_mime("audio/pcm"), None);
    }

    #[test]
    fn paket_roundtrip() {
        let samples = vec![0.1f32; 4096];
        let paket = EncodedPacket::from_samples(&samples, PcmFormat::capture());
        assert_eq!(paket.mime_type(), "audio/pcm;rate=16000");
        let buffer = paket.decode().unwrap();
        assert_eq!(buffer.frames(), 4096);
        assert_eq!(buffer.sample_rate(), 16000);
    }

    #[test]
    fn paket_mit_kaputter_kodierung() {
        let paket = EncodedPacket::from_wire(PcmFormat::output(), "%%%kein-base64%%%");
        assert!(matches!(paket.decode(), Err(AudioError::DecodeFehler(_))));
    }
}
