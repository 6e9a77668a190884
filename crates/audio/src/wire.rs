//! Transport-Kodierung fuer Binaerdaten
//!
//! Die Live-Verbindung ist textbasiert (JSON). PCM-Bytes werden deshalb
//! als Standard-Base64 transportiert. `from_wire(&to_wire(x)) == x` fuer
//! jede Bytefolge.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{AudioError, AudioResult};

/// Bytes -> Text
pub fn to_wire(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Text -> Bytes
pub fn from_wire(text: &str) -> AudioResult<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| AudioError::DecodeFehler(e.to_string()))
}
