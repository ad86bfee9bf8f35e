//! Body representation flags carried alongside decoded response text

use serde::{Deserialize, Serialize};

/// HTTP `Content-Encoding` of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
    #[serde(rename = "br")]
    Brotli,
}

impl ContentEncoding {
    /// Detect the encoding from a raw header value.
    ///
    /// Matching is by substring so stacked values such as `"gzip, chunked"`
    /// still resolve.
    pub fn from_header_value(value: &str) -> Self {
        let value = value.trim().to_ascii_lowercase();
        if value.contains("gzip") {
            ContentEncoding::Gzip
        } else if value.contains("deflate") {
            ContentEncoding::Deflate
        } else if value.contains("br") {
            ContentEncoding::Brotli
        } else {
            ContentEncoding::Identity
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Deflate => "deflate",
            ContentEncoding::Brotli => "br",
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, ContentEncoding::Identity)
    }
}

/// How the editable body text relates to the bytes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    /// Text is the UTF-8 content of the (decompressed) body
    #[default]
    Text,
    /// Body bytes are not UTF-8; text holds their base64 form
    Binary,
}
