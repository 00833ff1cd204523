//! Per-request mode controller.
//!
//! Every request is resolved to a target first. Unmatched requests go to the
//! fallback untouched; intercepted `OPTIONS` requests are answered as CORS
//! preflights; everything else is replayed, forwarded, or forwarded and
//! recorded according to the process-wide
//! [`ProxyMode`](crate::recording::ProxyMode).

use super::context::{InboundRequest, RequestHandlerContext};
use super::cors::{apply_cors, preflight_response, CorsRequest};
use super::headers::{
    is_dropped_response_header, RewindHeadersExt, VALUE_TRUE, X_REWIND_PROXIED, X_REWIND_RECORDED,
    X_REWIND_REPLAYED, X_REWIND_TARGET,
};
use super::response_ext::{json_response, ResponseExt};
use super::target::TargetResolver;
use super::ApiTarget;
use crate::error::ProxyError;
use crate::metrics;
use crate::recording::{is_json_content_type, parse_query, HeaderBag, Recording};

use chrono::Utc;
use http_body_util::combinators::BoxBody;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, error, info, warn};

/// How an intercepted request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Replayed,
    Recorded,
    Proxied,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Replayed => "replayed",
            Outcome::Recorded => "recorded",
            Outcome::Proxied => "proxied",
        }
    }
}

/// Handle one buffered request.
pub async fn handle_request(
    ctx: &RequestHandlerContext<'_>,
    req: Request<Bytes>,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let Some(target) = ctx.resolver.resolve(req.uri().path()) else {
        return ctx.fallback.handle(req).await.into_boxed();
    };

    let cors = CorsRequest::from_headers(req.headers());

    if req.method() == Method::OPTIONS {
        debug!(api_target = %target, "Preflight {}", req.uri().path());
        metrics::record_request(target.as_str(), "preflight");
        let mut response = preflight_response(&cors);
        response.set_header_value(&X_REWIND_TARGET, target.as_str());
        return response;
    }

    let inbound = InboundRequest::new(req);
    let mut response = match dispatch(ctx, &inbound, target).await {
        Ok((response, outcome)) => {
            metrics::record_request(target.as_str(), outcome.as_str());
            response
        }
        Err(err) => {
            let outcome = match &err {
                ProxyError::RecordingNotFound { .. } => "missing",
                _ => {
                    error!(
                        api_target = %target,
                        "Proxy error for {} {}: {}",
                        inbound.info.method,
                        inbound.info.endpoint(),
                        err
                    );
                    "error"
                }
            };
            metrics::record_request(target.as_str(), outcome);
            json_response(err.status(), &err.to_body())
        }
    };

    response.set_header_value(&X_REWIND_TARGET, target.as_str());
    apply_cors(&cors, response.headers_mut(), false);
    response.into_boxed()
}

/// 400 for a request whose body could not be read. Intercepted paths still
/// get CORS headers.
pub fn unreadable_body_response(
    resolver: &TargetResolver,
    parts: &Parts,
    message: String,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let mut response = json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({
            "error": "Bad request",
            "message": message,
        }),
    );
    if let Some(target) = resolver.resolve(parts.uri.path()) {
        metrics::record_request(target.as_str(), "error");
        response.set_header_value(&X_REWIND_TARGET, target.as_str());
        let cors = CorsRequest::from_headers(&parts.headers);
        apply_cors(&cors, response.headers_mut(), false);
    }
    response.into_boxed()
}

async fn dispatch(
    ctx: &RequestHandlerContext<'_>,
    req: &InboundRequest,
    target: ApiTarget,
) -> Result<(Response<Full<Bytes>>, Outcome), ProxyError> {
    let endpoint = req.info.endpoint();
    let method = req.info.method.as_str();
    let request_body = req.request_body();

    if ctx.mode.reads_recordings() {
        let stored = ctx
            .store
            .load(target, endpoint, method, request_body.as_ref())
            .await;
        if let Some(recording) = stored {
            info!(api_target = %target, "[REPLAY] {} {}", method, endpoint);
            let mut response = render_response(
                recording.status_code,
                &recording.headers,
                &recording.body,
                recording.unparsed_body,
            );
            response.set_header(&X_REWIND_REPLAYED, &VALUE_TRUE);
            return Ok((response, Outcome::Replayed));
        }

        if !ctx.mode.forwards() {
            warn!(api_target = %target, "[MISSING] {} {}", method, endpoint);
            return Err(ProxyError::RecordingNotFound {
                target,
                method: method.to_string(),
                endpoint: endpoint.to_string(),
            });
        }
    }

    info!(api_target = %target, "[PROXY] {} {}", method, endpoint);
    let forwarded = ctx.forwarder.forward(req, target).await?;
    let mut response = render_response(
        forwarded.status,
        &forwarded.headers,
        &forwarded.body,
        forwarded.unparsed_body,
    );

    if !ctx.mode.writes_recordings() {
        response.set_header(&X_REWIND_PROXIED, &VALUE_TRUE);
        return Ok((response, Outcome::Proxied));
    }

    let recording = Recording {
        endpoint: endpoint.to_string(),
        method: method.to_string(),
        status_code: forwarded.status,
        headers: forwarded.headers,
        body: forwarded.body,
        unparsed_body: forwarded.unparsed_body,
        timestamp: Utc::now(),
        query: Some(parse_query(req.info.uri.query().unwrap_or_default())),
        request_body,
    };
    let path = ctx
        .store
        .save(target, &recording)
        .await
        .map_err(|source| ProxyError::StoreWrite { target, source })?;
    metrics::record_recording_written(target.as_str());
    info!(
        api_target = %target,
        "[RECORDED] {} {} -> {}",
        method,
        endpoint,
        path.display()
    );

    response.set_header(&X_REWIND_RECORDED, &VALUE_TRUE);
    Ok((response, Outcome::Recorded))
}

/// Build a client response from a recorded or freshly forwarded exchange.
///
/// A string body is written as its raw text unless the headers declare JSON
/// and the body was parsed, in which case it is a JSON string document.
/// Framing and upstream CORS headers are dropped; a missing content type is
/// filled in from the body shape.
pub fn render_response(
    status: u16,
    headers: &HeaderBag,
    body: &serde_json::Value,
    unparsed_body: bool,
) -> Response<Full<Bytes>> {
    let declared_json = headers
        .get("content-type")
        .map(|ct| is_json_content_type(ct))
        .unwrap_or(false);
    let bytes = match body {
        serde_json::Value::String(text) if unparsed_body || !declared_json => {
            Bytes::from(text.clone())
        }
        other => Bytes::from(other.to_string()),
    };

    let mut response = Response::new(Full::new(bytes));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);

    for (name, value) in headers {
        if is_dropped_response_header(name) {
            continue;
        }
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!("Skipping unrepresentable header {}", name);
            continue;
        };
        // repeated set-cookie values are stored newline-separated
        for part in value.split('\n') {
            match HeaderValue::from_str(part) {
                Ok(value) => {
                    response.headers_mut().append(header_name.clone(), value);
                }
                Err(_) => debug!("Skipping unrepresentable value for header {}", name),
            }
        }
    }

    if !response.headers().contains_key(CONTENT_TYPE) {
        let content_type = match body {
            serde_json::Value::String(_) => "text/plain; charset=utf-8",
            _ => "application/json",
        };
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProxyConfig, UpstreamUrls};
    use crate::error::StoreError;
    use crate::proxy::client::create_http_client;
    use crate::proxy::fallback::{BuiltinRoutes, Fallback};
    use crate::proxy::forwarding::{flatten_headers, parse_body, Forwarder};
    use crate::proxy::target::TargetResolver;
    use crate::recording::{build_key, ProxyMode, RecordingStore};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        recordings: Mutex<HashMap<String, Recording>>,
        accesses: AtomicUsize,
    }

    #[async_trait]
    impl RecordingStore for MemoryStore {
        async fn save(
            &self,
            target: ApiTarget,
            recording: &Recording,
        ) -> Result<PathBuf, StoreError> {
            self.accesses.fetch_add(1, Ordering::SeqCst);
            let key = build_key(
                target,
                &recording.endpoint,
                &recording.method,
                recording.request_body.as_ref(),
            );
            self.recordings
                .lock()
                .unwrap()
                .insert(key.to_string(), recording.clone());
            Ok(key.relative_path())
        }

        async fn load(
            &self,
            target: ApiTarget,
            endpoint: &str,
            method: &str,
            request_body: Option<&serde_json::Value>,
        ) -> Option<Recording> {
            self.accesses.fetch_add(1, Ordering::SeqCst);
            let key = build_key(target, endpoint, method, request_body);
            self.recordings.lock().unwrap().get(&key.to_string()).cloned()
        }
    }

    struct Harness {
        resolver: TargetResolver,
        store: Arc<dyn RecordingStore>,
        memory: Arc<MemoryStore>,
        forwarder: Forwarder,
        fallback: Arc<dyn Fallback>,
    }

    impl Harness {
        /// Upstreams point at a closed local port so any forward fails fast.
        fn new(mode: ProxyMode) -> Self {
            let memory = Arc::new(MemoryStore::default());
            let upstreams = UpstreamUrls {
                base: "http://127.0.0.1:1".to_string(),
                golyzer: "http://127.0.0.1:1".to_string(),
                data: "http://127.0.0.1:1".to_string(),
            };
            let config = ProxyConfig {
                mode,
                upstreams: upstreams.clone(),
                ..Default::default()
            };
            let forwarder = Forwarder::new(
                create_http_client(&config),
                upstreams,
                Some(Duration::from_secs(5)),
            );
            Self {
                resolver: TargetResolver::with_defaults().unwrap(),
                store: memory.clone(),
                memory,
                forwarder,
                fallback: Arc::new(BuiltinRoutes::new(mode)),
            }
        }

        async fn send(
            &self,
            mode: ProxyMode,
            req: Request<Bytes>,
        ) -> Response<BoxBody<Bytes, hyper::Error>> {
            let ctx = RequestHandlerContext {
                mode,
                resolver: &self.resolver,
                store: &self.store,
                forwarder: &self.forwarder,
                fallback: &self.fallback,
            };
            handle_request(&ctx, req).await
        }

        fn accesses(&self) -> usize {
            self.memory.accesses.load(Ordering::SeqCst)
        }
    }

    fn request(method: &str, uri: &str, origin: Option<&str>) -> Request<Bytes> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        builder.body(Bytes::new()).unwrap()
    }

    async fn body_json(response: Response<BoxBody<Bytes, hyper::Error>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_render_json_body() {
        let mut headers = HeaderBag::new();
        headers.insert("content-length".to_string(), "999".to_string());
        headers.insert("access-control-allow-origin".to_string(), "*".to_string());
        headers.insert("x-request-id".to_string(), "abc".to_string());

        let response = render_response(201, &headers, &json!({"id": 7}), false);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()["x-request-id"], "abc");
        assert!(response.headers().get("content-length").is_none());
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_render_text_body_verbatim() {
        let mut headers = HeaderBag::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        let response = render_response(200, &headers, &json!("<p>ok</p>"), false);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"<p>ok</p>");
    }

    #[tokio::test]
    async fn test_render_json_string_document_keeps_quotes() {
        let mut headers = HeaderBag::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let (body, unparsed) = parse_body(Some("application/json"), br#""hello""#);

        let response = render_response(200, &headers, &body, unparsed);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#""hello""#);
    }

    #[tokio::test]
    async fn test_render_unparsed_json_body_verbatim() {
        let mut headers = HeaderBag::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let (body, unparsed) = parse_body(Some("application/json"), b"{broken");

        let response = render_response(502, &headers, &body, unparsed);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"{broken");
    }

    #[test]
    fn test_render_splits_set_cookie() {
        let mut upstream = hyper::HeaderMap::new();
        upstream.append("set-cookie", HeaderValue::from_static("a=1; Expires=Wed, 21 Oct 2026 07:28:00 GMT"));
        upstream.append("set-cookie", HeaderValue::from_static("b=2"));
        let headers = flatten_headers(&upstream);

        let response = render_response(200, &headers, &json!({}), false);
        let cookies: Vec<_> = response
            .headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            cookies,
            vec!["a=1; Expires=Wed, 21 Oct 2026 07:28:00 GMT".to_string(), "b=2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unreadable_body_gets_cors_on_intercepted_path() {
        let harness = Harness::new(ProxyMode::Record);
        let (parts, _) = request("POST", "/panels/1", Some("https://app.example")).into_parts();

        let response =
            unreadable_body_response(&harness.resolver, &parts, "connection reset".to_string());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://app.example"
        );
        assert_eq!(response.headers()[&X_REWIND_TARGET], "golyzer");
        let body = body_json(response).await;
        assert_eq!(body["error"], "Bad request");
        assert_eq!(body["message"], "connection reset");
    }

    #[test]
    fn test_unreadable_body_on_unmatched_path_has_no_cors() {
        let harness = Harness::new(ProxyMode::Record);
        let (parts, _) = request("POST", "/users/1", Some("https://app.example")).into_parts();

        let response =
            unreadable_body_response(&harness.resolver, &parts, "connection reset".to_string());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn test_render_invalid_status_is_bad_gateway() {
        let response = render_response(42, &HeaderBag::new(), &json!(null), false);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_unmatched_path_skips_store() {
        let harness = Harness::new(ProxyMode::Record);
        let response = harness
            .send(ProxyMode::Record, request("GET", "/users/1", None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(&X_REWIND_TARGET).is_none());
        assert_eq!(harness.accesses(), 0);
    }

    #[tokio::test]
    async fn test_replay_miss_returns_hint_with_cors() {
        let harness = Harness::new(ProxyMode::Replay);
        let response = harness
            .send(
                ProxyMode::Replay,
                request("POST", "/authentication", Some("https://app.example")),
            )
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://app.example"
        );
        assert_eq!(response.headers()[&X_REWIND_TARGET], "base");
        let body = body_json(response).await;
        assert_eq!(body["error"], "Recording not found");
        assert_eq!(body["target"], "base");
    }

    #[tokio::test]
    async fn test_replay_hit_serves_recording() {
        let harness = Harness::new(ProxyMode::Replay);
        let recording = Recording {
            endpoint: "/panels/123".to_string(),
            method: "GET".to_string(),
            status_code: 200,
            headers: HeaderBag::new(),
            body: json!({"id": 123, "name": "Sales"}),
            unparsed_body: false,
            timestamp: Utc::now(),
            query: None,
            request_body: None,
        };
        harness.store.save(ApiTarget::Golyzer, &recording).await.unwrap();

        let response = harness
            .send(ProxyMode::Replay, request("GET", "/panels/123?full=1", None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&X_REWIND_REPLAYED], "true");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(body_json(response).await, json!({"id": 123, "name": "Sales"}));
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let harness = Harness::new(ProxyMode::Replay);
        let response = harness
            .send(
                ProxyMode::Replay,
                request("OPTIONS", "/query", Some("https://app.example")),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://app.example"
        );
        assert_eq!(harness.accesses(), 0);
    }

    #[tokio::test]
    async fn test_passthrough_unreachable_is_bad_gateway() {
        let harness = Harness::new(ProxyMode::Passthrough);
        let response = harness
            .send(
                ProxyMode::Passthrough,
                request("GET", "/me", Some("https://app.example")),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://app.example"
        );
        assert_eq!(harness.accesses(), 0);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Proxy error");
        assert_eq!(body["target"], "golyzer");
    }

    #[tokio::test]
    async fn test_record_miss_with_unreachable_upstream_writes_nothing() {
        let harness = Harness::new(ProxyMode::Record);
        let response = harness
            .send(ProxyMode::Record, request("GET", "/charts", None))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(harness.memory.recordings.lock().unwrap().is_empty());
    }
}
