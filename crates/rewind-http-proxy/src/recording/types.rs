//! Types for proxy recording - the archived exchange and its header bag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header bag keyed by lowercase header name.
pub type HeaderBag = BTreeMap<String, String>;

/// One archived HTTP exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    /// Request path without the query string
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: HeaderBag,
    /// Structured JSON body, or a JSON string holding raw text
    #[serde(default)]
    pub body: serde_json::Value,
    /// Declared JSON but stored as raw text in `body`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unparsed_body: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, String>>,
    /// Body sent by the original caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<serde_json::Value>,
}

impl Recording {
    /// Whether the recorded response declared a JSON content type.
    pub fn is_json(&self) -> bool {
        self.headers
            .get("content-type")
            .map(|ct| is_json_content_type(ct))
            .unwrap_or(false)
    }
}

pub fn is_json_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("application/json") || ct.contains("+json")
}

/// Parse a raw query string into a map, decoding `+` and percent escapes.
/// Later duplicates win.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
