//! Record/replay proxy server.
//!
//! Requests under a fixed set of path prefixes are intercepted and served
//! according to the process-wide [`ProxyMode`](crate::recording::ProxyMode):
//! replayed from disk, forwarded live, or forwarded and archived. Everything
//! else is handed to a [`Fallback`].
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct and main run loop
//! - `handler` - Per-request mode controller
//! - `target` - Path prefix to upstream target resolution
//! - `forwarding` - Request forwarding to upstream servers
//! - `client` - HTTP client creation and configuration
//! - `cors` - CORS header synthesis and preflight responses
//! - `fallback` - Routing for non-intercepted requests

mod client;
mod context;
mod cors;
mod fallback;
mod forwarding;
mod handler;
mod headers;
mod response_ext;
mod server;
mod target;

pub use client::{create_http_client, HttpClient};
pub use context::{InboundRequest, RequestHandlerContext, RequestInfo};
pub use cors::{apply_cors, preflight_response, CorsRequest, ALLOWED_METHODS, DEFAULT_ALLOWED_HEADERS};
pub use fallback::{not_handled, BuiltinRoutes, Fallback};
pub use forwarding::{ForwardedResponse, Forwarder};
pub use handler::{handle_request, render_response};
pub use headers::{
    RewindHeadersExt, X_REWIND_PROXIED, X_REWIND_RECORDED, X_REWIND_REPLAYED, X_REWIND_TARGET,
};
pub use response_ext::{json_response, ResponseExt};
pub use server::ProxyServer;
pub use target::{ApiTarget, TargetResolver, DEFAULT_PREFIXES};
