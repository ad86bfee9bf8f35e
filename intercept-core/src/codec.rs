//! Response body transforms
//!
//! Bodies arrive from the host either as plain text or as base64, possibly
//! compressed. Decoding always goes base64 -> bytes -> (decompress) -> UTF-8
//! so multi-byte sequences survive; encoding runs the same chain backwards.

use crate::error::CodecError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use intercept_common::headers::header_value;
use intercept_common::{BodyKind, ContentEncoding, HeaderEntry};
use std::io::{Read, Write};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A response body made editable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedBody {
    /// Editable text; base64 of the bytes when `kind` is `Binary`
    pub text: String,
    pub kind: BodyKind,
    /// The host delivered the body base64-encoded
    pub was_base64: bool,
    /// Encoding declared by the response headers
    pub encoding: ContentEncoding,
    /// `text` still represents compressed bytes
    pub is_compressed: bool,
    /// Why decoding fell back, if it did
    pub error: Option<String>,
}

impl DecodedBody {
    /// Bytes the text stands for
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        text_to_bytes(&self.text, self.kind)
    }
}

/// Wire-ready form of an edited body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    /// Base64 of the final bytes, as the fulfill primitive expects
    pub base64: String,
    /// Length of the final bytes, for a fresh `Content-Length`
    pub content_length: usize,
    /// Encoding actually applied; `Identity` when none was
    pub encoding: ContentEncoding,
}

/// Read the `Content-Encoding` header
pub fn detect_content_encoding(headers: &[HeaderEntry]) -> ContentEncoding {
    header_value(headers, "content-encoding")
        .map(ContentEncoding::from_header_value)
        .unwrap_or_default()
}

/// Turn a host-delivered body into editable text.
///
/// Never fails: any problem leaves the best-effort content in place and is
/// recorded in [`DecodedBody::error`].
pub fn decode(raw: &str, is_base64: bool, encoding: ContentEncoding) -> DecodedBody {
    let mut error = None;

    let bytes = if is_base64 {
        match STANDARD.decode(raw.trim()) {
            Ok(bytes) => bytes,
            Err(err) => {
                error = Some(format!("body is not valid base64: {}", err));
                raw.as_bytes().to_vec()
            }
        }
    } else {
        raw.as_bytes().to_vec()
    };

    let (bytes, is_compressed) = match decompress(&bytes, encoding) {
        Ok(Some(plain)) => (plain, false),
        // Host already removed the compression
        Ok(None) => (bytes, false),
        Err(reason) => {
            error = Some(reason);
            (bytes, true)
        }
    };

    let (text, kind) = match String::from_utf8(bytes) {
        Ok(text) => (text, BodyKind::Text),
        Err(err) => (STANDARD.encode(err.into_bytes()), BodyKind::Binary),
    };

    DecodedBody {
        text,
        kind,
        was_base64: is_base64,
        encoding,
        is_compressed,
        error,
    }
}

/// Turn edited text into the bytes handed to the host, optionally compressed
/// with `target`.
///
/// Brotli cannot be produced; such bodies are delivered as identity.
pub fn encode(text: &str, kind: BodyKind, target: ContentEncoding) -> Result<EncodedBody, CodecError> {
    let bytes = text_to_bytes(text, kind)?;

    let (bytes, encoding) = match target {
        ContentEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&bytes)?;
            (encoder.finish()?, ContentEncoding::Gzip)
        }
        ContentEncoding::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&bytes)?;
            (encoder.finish()?, ContentEncoding::Deflate)
        }
        ContentEncoding::Brotli => {
            tracing::debug!("brotli recompression unsupported, sending identity body");
            (bytes, ContentEncoding::Identity)
        }
        ContentEncoding::Identity => (bytes, ContentEncoding::Identity),
    };

    Ok(EncodedBody {
        base64: STANDARD.encode(&bytes),
        content_length: bytes.len(),
        encoding,
    })
}

fn text_to_bytes(text: &str, kind: BodyKind) -> Result<Vec<u8>, CodecError> {
    match kind {
        BodyKind::Text => Ok(text.as_bytes().to_vec()),
        BodyKind::Binary => Ok(STANDARD.decode(text.trim())?),
    }
}

/// `Ok(None)` means the bytes are not compressed despite the header.
fn decompress(bytes: &[u8], encoding: ContentEncoding) -> Result<Option<Vec<u8>>, String> {
    match encoding {
        ContentEncoding::Identity => Ok(None),
        ContentEncoding::Gzip => {
            if !bytes.starts_with(&GZIP_MAGIC) {
                return Ok(None);
            }
            read_all(GzDecoder::new(bytes))
                .map(Some)
                .map_err(|err| format!("gzip decompression failed: {}", err))
        }
        ContentEncoding::Deflate => match read_all(ZlibDecoder::new(bytes)) {
            Ok(plain) => Ok(Some(plain)),
            // Readable text was already decoded by the host
            Err(_) if std::str::from_utf8(bytes).is_ok() => Ok(None),
            // Some servers send raw deflate without the zlib wrapper
            Err(_) => inflate_raw(bytes).map(Some),
        },
        ContentEncoding::Brotli => {
            if std::str::from_utf8(bytes).is_ok() {
                Ok(None)
            } else {
                Err("brotli decompression is not supported".to_string())
            }
        }
    }
}

/// Raw deflate is only trusted when the stream ends exactly at the input's end
fn inflate_raw(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut plain = Vec::new();
    decoder
        .read_to_end(&mut plain)
        .map_err(|err| format!("deflate decompression failed: {}", err))?;
    if decoder.total_in() != bytes.len() as u64 {
        return Err("deflate decompression failed: trailing data after stream end".to_string());
    }
    Ok(plain)
}

fn read_all<R: Read>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_base64_json_body() {
        let body = decode("eyJvayI6dHJ1ZX0=", true, ContentEncoding::Identity);
        assert_eq!(body.text, r#"{"ok":true}"#);
        assert_eq!(body.kind, BodyKind::Text);
        assert!(body.was_base64);
        assert!(!body.is_compressed);
        assert!(body.error.is_none());
    }

    #[test]
    fn test_multibyte_text_is_not_mangled() {
        let original = "日本語テキスト 🚀 ünïcödé";
        let raw = STANDARD.encode(original.as_bytes());
        assert_eq!(decode(&raw, true, ContentEncoding::Identity).text, original);
    }

    #[test]
    fn test_gzip_body_is_decompressed() {
        let raw = STANDARD.encode(gzip(br#"{"users":[]}"#));
        let body = decode(&raw, true, ContentEncoding::Gzip);
        assert_eq!(body.text, r#"{"users":[]}"#);
        assert!(!body.is_compressed);
    }

    #[test]
    fn test_raw_deflate_body_is_decompressed() {
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), Compression::none());
        encoder.write_all(b"plain deflate").unwrap();
        let raw = STANDARD.encode(encoder.finish().unwrap());

        assert_eq!(decode(&raw, true, ContentEncoding::Deflate).text, "plain deflate");
    }

    #[test]
    fn test_plain_text_under_deflate_header_is_kept() {
        let text = "{pa0a0#a!A!<Jp E@";
        let body = decode(text, false, ContentEncoding::Deflate);
        assert_eq!(body.text, text);
        assert_eq!(body.kind, BodyKind::Text);
        assert!(!body.is_compressed);
        assert!(body.error.is_none());

        let body = decode(&STANDARD.encode(text), true, ContentEncoding::Deflate);
        assert_eq!(body.text, text);
        assert_eq!(body.kind, BodyKind::Text);
    }

    #[test]
    fn test_raw_deflate_with_trailing_bytes_is_rejected() {
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), Compression::none());
        encoder.write_all(b"plain deflate").unwrap();
        let mut bytes = encoder.finish().unwrap();
        bytes.extend_from_slice(&[0xfe, 0xff, 0x00]);

        assert!(inflate_raw(&bytes).is_err());
    }

    #[test]
    fn test_already_decompressed_body_is_kept() {
        let body = decode(r#"{"ok":true}"#, false, ContentEncoding::Gzip);
        assert_eq!(body.text, r#"{"ok":true}"#);
        assert!(!body.is_compressed);
        assert!(body.error.is_none());
    }

    #[test]
    fn test_corrupt_gzip_fails_soft() {
        let mut bytes = GZIP_MAGIC.to_vec();
        bytes.extend_from_slice(&[0xff, 0x00, 0x13, 0x37]);
        let raw = STANDARD.encode(&bytes);

        let body = decode(&raw, true, ContentEncoding::Gzip);
        assert!(body.is_compressed);
        assert!(body.error.is_some());
        assert_eq!(body.kind, BodyKind::Binary);
        assert_eq!(body.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_brotli_is_flagged() {
        let bytes = vec![0x8b, 0x05, 0x80, 0xff, 0xfe];
        let body = decode(&STANDARD.encode(&bytes), true, ContentEncoding::Brotli);
        assert!(body.is_compressed);
        assert_eq!(body.to_bytes().unwrap(), bytes);

        let encoded = encode("hello", BodyKind::Text, ContentEncoding::Brotli).unwrap();
        assert_eq!(encoded.encoding, ContentEncoding::Identity);
    }

    #[test]
    fn test_invalid_base64_fails_soft() {
        let body = decode("not base64 at all!", true, ContentEncoding::Identity);
        assert_eq!(body.text, "not base64 at all!");
        assert!(body.error.is_some());
    }

    #[test]
    fn test_content_length_counts_bytes() {
        let encoded = encode("héllo", BodyKind::Text, ContentEncoding::Identity).unwrap();
        assert_eq!(encoded.content_length, 6);
        assert_eq!(encoded.base64, STANDARD.encode("héllo".as_bytes()));
    }

    #[test]
    fn test_binary_body_survives_edit() {
        let bytes = vec![0u8, 159, 146, 150, 255];
        let body = decode(&STANDARD.encode(&bytes), true, ContentEncoding::Identity);
        assert_eq!(body.kind, BodyKind::Binary);

        let encoded = encode(&body.text, body.kind, ContentEncoding::Identity).unwrap();
        assert_eq!(STANDARD.decode(encoded.base64).unwrap(), bytes);
        assert!(encode("%%%", BodyKind::Binary, ContentEncoding::Identity).is_err());
    }

    #[test]
    fn test_detect_content_encoding() {
        let headers = vec![
            HeaderEntry::new("Content-Type", "application/json"),
            HeaderEntry::new("Content-Encoding", "GZIP"),
        ];
        assert_eq!(detect_content_encoding(&headers), ContentEncoding::Gzip);
        assert_eq!(detect_content_encoding(&[]), ContentEncoding::Identity);
    }

    proptest! {
        #[test]
        fn prop_text_round_trip(text in "\\PC*") {
            let encoded = encode(&text, BodyKind::Text, ContentEncoding::Identity).unwrap();
            let decoded = decode(&encoded.base64, true, ContentEncoding::Identity);
            prop_assert_eq!(decoded.text, text);
        }

        #[test]
        fn prop_decoded_text_under_deflate_is_exact(text in "[ -~]{0,64}") {
            let decoded = decode(&text, false, ContentEncoding::Deflate);
            prop_assert_eq!(decoded.kind, BodyKind::Text);
            prop_assert_eq!(decoded.text, text);
        }

        #[test]
        fn prop_recompressed_round_trip(text in "\\PC*") {
            let encoded = encode(&text, BodyKind::Text, ContentEncoding::Gzip).unwrap();
            let decoded = decode(&encoded.base64, true, encoded.encoding);
            prop_assert_eq!(decoded.text, text);
        }
    }
}
