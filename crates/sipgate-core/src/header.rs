//! The SIP header map and its canonical key casing.

use std::collections::HashMap;
use std::fmt::Write as _;

/// Header maps a case-normalized header name to a single string value.
///
/// Header names are normalized on every insert: each hyphen-separated token is
/// rendered as an uppercase first letter followed by lowercase remainder
/// (e.g. `call-id` and `CALL-ID` both become `Call-Id`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header(HashMap<String, String>);

impl Header {
    pub fn new() -> Self {
        Header(HashMap::new())
    }

    /// Returns the value at `key`, or the empty string if absent.
    pub fn get(&self, key: &str) -> &str {
        self.0.get(&canonicalize(key)).map(String::as_str).unwrap_or("")
    }

    /// Sets `key` to `value`, overwriting any prior value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(canonicalize(key), value.into());
    }

    /// Deletes `key`. A no-op if the key is absent.
    pub fn del(&mut self, key: &str) {
        self.0.remove(&canonicalize(key));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(&canonicalize(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders `Key: value\r\n` for every entry, followed by a terminating
    /// blank line, in unspecified order.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let mut rendered = String::new();
        for (key, value) in &self.0 {
            let _ = write!(rendered, "{key}: {value}\r\n");
        }
        rendered.push_str("\r\n");
        out.extend_from_slice(rendered.as_bytes());
    }
}

/// Normalizes a header key to canonical SIP casing: each hyphen-separated
/// token gets an uppercase first letter and lowercase remainder.
pub fn canonicalize(key: &str) -> String {
    key.split('-')
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
