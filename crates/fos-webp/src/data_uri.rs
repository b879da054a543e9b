//! Data URIs
//!
//! Parsing of `data:[<mime>][;base64],<payload>` sources. Probe payloads are
//! shipped this way so decoders see them exactly like any other image source.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Data URI parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUriError {
    #[error("not a data URI")]
    NotDataUri,

    #[error("data URI is missing the ',' separator")]
    MissingSeparator,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("invalid percent escape at byte {0}")]
    InvalidEscape(usize),
}

/// A parsed data URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// Media type, `text/plain` when omitted
    pub mime_type: String,
    /// Decoded payload
    pub data: Vec<u8>,
}

impl DataUri {
    /// Parse a data URI
    pub fn parse(uri: &str) -> Result<Self, DataUriError> {
        let rest = strip_scheme(uri).ok_or(DataUriError::NotDataUri)?;
        let (header, payload) = rest.split_once(',').ok_or(DataUriError::MissingSeparator)?;

        let mut params = header.split(';');
        let mime_type = match params.next().map(str::trim) {
            Some(m) if !m.is_empty() => m.to_ascii_lowercase(),
            _ => "text/plain".to_string(),
        };
        let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

        let data = if is_base64 {
            let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| DataUriError::InvalidBase64(e.to_string()))?
        } else {
            percent_decode(payload)?
        };

        Ok(Self { mime_type, data })
    }

    /// Build a base64 data URI
    pub fn encode(mime_type: &str, data: &[u8]) -> String {
        format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
    }

    /// Check whether a source is a data URI
    pub fn is_data_uri(uri: &str) -> bool {
        strip_scheme(uri).is_some()
    }
}

fn strip_scheme(uri: &str) -> Option<&str> {
    let trimmed = uri.trim_start();
    let scheme = trimmed.get(..5)?;
    if scheme.eq_ignore_ascii_case("data:") {
        Some(&trimmed[5..])
    } else {
        None
    }
}

fn percent_decode(payload: &str) -> Result<Vec<u8>, DataUriError> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = payload.get(i + 1..i + 3).ok_or(DataUriError::InvalidEscape(i))?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| DataUriError::InvalidEscape(i))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base64() {
        let uri = DataUri::parse("data:image/webp;base64,UklGRg==").unwrap();
        assert_eq!(uri.mime_type, "image/webp");
        assert_eq!(uri.data, b"RIFF");
    }

    #[test]
    fn test_parse_plain() {
        let uri = DataUri::parse("data:,Hello%2C%20World").unwrap();
        assert_eq!(uri.mime_type, "text/plain");
        assert_eq!(uri.data, b"Hello, World");
    }

    #[test]
    fn test_encode_matches_parse() {
        let encoded = DataUri::encode("image/png", &[0x89, b'P', b'N', b'G']);
        assert!(encoded.starts_with("data:image/png;base64,"));
        assert_eq!(DataUri::parse(&encoded).unwrap().data, vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_rejects_non_data() {
        assert_eq!(DataUri::parse("https://example.com/a.webp"), Err(DataUriError::NotDataUri));
        assert_eq!(DataUri::parse("data:image/webp;base64"), Err(DataUriError::MissingSeparator));
        assert!(matches!(
            DataUri::parse("data:image/webp;base64,@@@"),
            Err(DataUriError::InvalidBase64(_))
        ));
        assert_eq!(DataUri::parse("data:,%zz"), Err(DataUriError::InvalidEscape(0)));
    }
}
