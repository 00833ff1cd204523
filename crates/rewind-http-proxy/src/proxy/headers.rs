//! Safe header insertion helpers.
//!
//! Compile-time header names for Rewind's marker headers and the sets of
//! framing headers stripped at each hop, plus an extension trait that avoids
//! runtime `.parse().unwrap()` calls.

use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;

// Marker headers
pub static X_REWIND_PROXIED: HeaderName = HeaderName::from_static("x-rewind-proxied");
pub static X_REWIND_RECORDED: HeaderName = HeaderName::from_static("x-rewind-recorded");
pub static X_REWIND_REPLAYED: HeaderName = HeaderName::from_static("x-rewind-replayed");
pub static X_REWIND_TARGET: HeaderName = HeaderName::from_static("x-rewind-target");

pub static VALUE_TRUE: HeaderValue = HeaderValue::from_static("true");

/// Request headers never copied to the upstream call.
pub const HOP_BY_HOP_REQUEST: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "accept-encoding",
];

/// Recorded response headers never written back to the client.
pub const FRAMING_RESPONSE: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "content-encoding",
];

pub fn is_hop_by_hop_request(name: &str) -> bool {
    HOP_BY_HOP_REQUEST
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Whether a recorded header should be dropped when rendering a response.
/// Upstream CORS headers are dropped too since they are synthesized.
pub fn is_dropped_response_header(name: &str) -> bool {
    FRAMING_RESPONSE.iter().any(|h| h.eq_ignore_ascii_case(name))
        || name.to_ascii_lowercase().starts_with("access-control-")
}

/// Extension trait for inserting headers into responses.
pub trait RewindHeadersExt {
    /// Insert a header with a static name and value.
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Insert a header with a dynamic string value.
    /// Returns false if the value couldn't be converted to a valid header value.
    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool;
}

impl<B> RewindHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.headers_mut().insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }
}
