//! Data URI helpers
//!
//! Everything sent to the browser is embeddable: `data:<mime>;base64,<payload>`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

const BASE64_MARKER: &str = "base64,";

/// Build `data:<mime>;base64,<payload>`.
pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};{BASE64_MARKER}{}", STANDARD.encode(bytes))
}

/// Decode an uploaded payload: everything after the `base64,` marker, or the
/// whole string when there is no marker.
pub fn decode(uri: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = uri
        .rsplit_once(BASE64_MARKER)
        .map_or(uri, |(_, payload)| payload);
    STANDARD.decode(payload.trim())
}
