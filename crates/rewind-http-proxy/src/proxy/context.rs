//! Context structs for request handling.
//!
//! `RequestHandlerContext` bundles the shared server state a request needs;
//! `InboundRequest` is the buffered view of the request itself.

use bytes::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Method, Request, Uri};
use std::sync::Arc;

use super::fallback::Fallback;
use super::forwarding::Forwarder;
use super::target::TargetResolver;
use crate::recording::{is_json_content_type, ProxyMode, RecordingStore};

/// Shared state borrowed by `handle_request` for one request.
pub struct RequestHandlerContext<'a> {
    pub mode: ProxyMode,
    pub resolver: &'a TargetResolver,
    pub store: &'a Arc<dyn RecordingStore>,
    pub forwarder: &'a Forwarder,
    pub fallback: &'a Arc<dyn Fallback>,
}

/// Extracted request metadata
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        }
    }

    /// Path without the query string.
    pub fn endpoint(&self) -> &str {
        self.uri.path()
    }
}

/// Inbound request with its body collected.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub info: RequestInfo,
    pub body: Bytes,
    /// Body parsed as JSON, when it is JSON
    pub json: Option<serde_json::Value>,
}

impl InboundRequest {
    pub fn new(req: Request<Bytes>) -> Self {
        let info = RequestInfo::from_request(&req);
        let body = req.into_body();
        let json = parse_json_body(&info.headers, &body);
        Self { info, body, json }
    }

    /// Body as recorded and used for key derivation: parsed JSON, raw text
    /// for anything else, `None` when empty or JSON `null`.
    pub fn request_body(&self) -> Option<serde_json::Value> {
        match &self.json {
            Some(serde_json::Value::Null) => None,
            Some(value) => Some(value.clone()),
            None if self.body.is_empty() => None,
            None => Some(serde_json::Value::String(
                String::from_utf8_lossy(&self.body).into_owned(),
            )),
        }
    }
}

/// JSON is recognised by content type, or by successfully parsing a body
/// sent without one.
fn parse_json_body(headers: &HeaderMap, body: &Bytes) -> Option<serde_json::Value> {
    if body.is_empty() {
        return None;
    }
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    match content_type {
        Some(ct) if !is_json_content_type(ct) => None,
        _ => serde_json::from_slice(body).ok(),
    }
}
