//! Inline image payloads
//!
//! The client uploads images as `data:` URLs straight from a `FileReader`,
//! but bare base64 is accepted too. The payload is decoded once to reject
//! garbage before it is forwarded to the model.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::client::{LlmError, LlmResult};

/// MIME type assumed when neither the data URL nor the bytes say otherwise
pub const FALLBACK_MIME: &str = "image/jpeg";

/// A validated base64 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime: String,
    base64: String,
    size: usize,
}

impl ImagePayload {
    /// Parses a data URL (`data:image/png;base64,...`) or bare base64
    pub fn parse(input: &str) -> LlmResult<Self> {
        let input = input.trim();

        let (declared_mime, payload) = match input.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| invalid("data URL has no payload"))?;
                let mut params = header.split(';');
                let mime = params.next().unwrap_or_default().trim().to_ascii_lowercase();
                if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                    return Err(invalid("data URL is not base64-encoded"));
                }
                if !mime.is_empty() && !mime.starts_with("image/") {
                    return Err(invalid(&format!("expected an image, got {}", mime)));
                }
                (Some(mime).filter(|m| !m.is_empty()), payload)
            }
            None => (None, input),
        };

        let base64: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(&base64)
            .map_err(|e| invalid(&format!("payload is not valid base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(invalid("image is empty"));
        }

        let mime = declared_mime
            .or_else(|| sniff_mime(&bytes).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_MIME.to_string());

        Ok(Self {
            mime,
            base64,
            size: bytes.len(),
        })
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Decoded size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Canonical `data:` URL for the model request
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

/// Identifies common image formats from their magic bytes
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

fn invalid(msg: &str) -> LlmError {
    LlmError::InvalidInput(format!("Invalid image: {}", msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_parse_data_url_keeps_declared_mime() {
        let encoded = STANDARD.encode(PNG_HEADER);
        let image = ImagePayload::parse(&format!("data:image/webp;base64,{}", encoded)).unwrap();

        assert_eq!(image.mime(), "image/webp");
        assert_eq!(image.size(), PNG_HEADER.len());
        assert_eq!(image.data_url(), format!("data:image/webp;base64,{}", encoded));
    }

    #[test]
    fn test_parse_bare_base64_sniffs_mime() {
        let image = ImagePayload::parse(&STANDARD.encode(PNG_HEADER)).unwrap();
        assert_eq!(image.mime(), "image/png");

        let gif = ImagePayload::parse(&STANDARD.encode(b"GIF89a....")).unwrap();
        assert_eq!(gif.mime(), "image/gif");

        let unknown = ImagePayload::parse(&STANDARD.encode(b"plain bytes")).unwrap();
        assert_eq!(unknown.mime(), FALLBACK_MIME);
    }

    #[test]
    fn test_parse_strips_whitespace() {
        let encoded = STANDARD.encode(PNG_HEADER);
        let (a, b) = encoded.split_at(6);
        let image = ImagePayload::parse(&format!("{}\n {}", a, b)).unwrap();
        assert_eq!(image.mime(), "image/png");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ImagePayload::parse("").is_err());
        assert!(ImagePayload::parse("data:image/png;base64,").is_err());
        assert!(ImagePayload::parse("data:image/png,rawdata").is_err());
        assert!(ImagePayload::parse("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(ImagePayload::parse("%%% not base64 %%%").is_err());
        assert!(ImagePayload::parse("data:image/png;base64").is_err());
    }

    #[test]
    fn test_sniff_webp() {
        let mut webp = b"RIFF\0\0\0\0WEBPVP8 ".to_vec();
        webp.extend_from_slice(&[0; 4]);
        assert_eq!(sniff_mime(&webp), Some("image/webp"));
        assert_eq!(sniff_mime(b"RIFF"), None);
    }
}
