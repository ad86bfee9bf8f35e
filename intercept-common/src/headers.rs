//! Ordered HTTP header lists
//!
//! Header names are not unique (`Set-Cookie` may repeat), so headers are kept
//! as an ordered list of entries and never collapsed into a map.

use serde::{Deserialize, Serialize};

/// A single HTTP header as delivered by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive name comparison
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// First value of `name`, compared case-insensitively
pub fn header_value<'a>(headers: &'a [HeaderEntry], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.is(name))
        .map(|header| header.value.as_str())
}

/// Remove every entry named `name`, returning how many were dropped
pub fn remove_header(headers: &mut Vec<HeaderEntry>, name: &str) -> usize {
    let before = headers.len();
    headers.retain(|header| !header.is(name));
    before - headers.len()
}
