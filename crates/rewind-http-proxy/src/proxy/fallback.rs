//! Routing for requests the proxy does not intercept.
//!
//! The fixture CRUD routes live outside this crate; they plug in through the
//! [`Fallback`] trait. [`BuiltinRoutes`] serves the proxy's own endpoints and
//! answers everything else with 404.

use super::response_ext::json_response;
use crate::metrics;
use crate::recording::ProxyMode;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};

/// Handler for non-intercepted requests.
#[async_trait]
pub trait Fallback: Send + Sync {
    async fn handle(&self, req: Request<Bytes>) -> Response<Full<Bytes>>;
}

/// `/health`, `/metrics`, and 404 for everything else.
pub struct BuiltinRoutes {
    mode: ProxyMode,
}

impl BuiltinRoutes {
    pub fn new(mode: ProxyMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl Fallback for BuiltinRoutes {
    async fn handle(&self, req: Request<Bytes>) -> Response<Full<Bytes>> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/health") => json_response(
                StatusCode::OK,
                &serde_json::json!({"status": "ok", "mode": self.mode.as_str()}),
            ),
            (&Method::GET, "/metrics") => {
                let mut response = Response::new(Full::new(Bytes::from(metrics::collect_metrics())));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            _ => not_handled(),
        }
    }
}

/// 404 for routes nothing handles.
pub fn not_handled() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({"error": "Not found", "message": "Route not handled by proxy"}),
    )
}
