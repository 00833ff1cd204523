//! Request forwarding to upstream servers.
//!
//! The forwarder only performs the network call and normalizes the answer.
//! It never touches the recording store.

use super::client::HttpClient;
use super::context::InboundRequest;
use super::headers::is_hop_by_hop_request;
use super::ApiTarget;
use crate::config::UpstreamUrls;
use crate::error::ForwardError;
use crate::metrics;
use crate::recording::{is_json_content_type, HeaderBag};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, SET_COOKIE};
use hyper::{Method, Request, Uri};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upstream answer in transport-agnostic form.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedResponse {
    pub status: u16,
    pub headers: HeaderBag,
    /// Parsed JSON for JSON responses, otherwise a JSON string of the raw text
    pub body: serde_json::Value,
    /// Declared JSON but kept as raw text in `body`
    pub unparsed_body: bool,
}

/// Issues upstream calls for intercepted requests.
pub struct Forwarder {
    client: HttpClient,
    upstreams: UpstreamUrls,
    timeout: Option<Duration>,
}

impl Forwarder {
    pub fn new(client: HttpClient, upstreams: UpstreamUrls, timeout: Option<Duration>) -> Self {
        Self {
            client,
            upstreams,
            timeout,
        }
    }

    /// Absolute upstream URL for a request path and query.
    pub fn upstream_url(&self, target: ApiTarget, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.upstreams.url_for(target), path_and_query)
    }

    /// Forward a request to its target upstream.
    ///
    /// A 4xx/5xx upstream answer is a successful forward; only network
    /// failures and timeouts are errors.
    pub async fn forward(
        &self,
        req: &InboundRequest,
        target: ApiTarget,
    ) -> Result<ForwardedResponse, ForwardError> {
        let full_uri = self.upstream_url(target, &req.info.uri);
        debug!("Forwarding to: {}", full_uri);

        let upstream_req = build_upstream_request(req, target, &full_uri)?;

        let start = Instant::now();
        let call = async {
            let response = self
                .client
                .request(upstream_req)
                .await
                .map_err(|e| ForwardError::Unreachable {
                    target,
                    message: error_chain(&e),
                })?;
            let (parts, body) = response.into_parts();
            let bytes = body
                .collect()
                .await
                .map_err(|e| ForwardError::Unreachable {
                    target,
                    message: format!("failed to read upstream body: {}", error_chain(&e)),
                })?
                .to_bytes();
            Ok::<_, ForwardError>((parts, bytes))
        };

        let (parts, bytes) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ForwardError::Timeout {
                    target,
                    after_ms: limit.as_millis() as u64,
                }
            })??,
            None => call.await?,
        };

        let status = parts.status.as_u16();
        metrics::record_upstream_duration(
            target.as_str(),
            status,
            start.elapsed().as_secs_f64() * 1000.0,
        );

        let headers = flatten_headers(&parts.headers);
        let (body, unparsed_body) =
            parse_body(headers.get("content-type").map(String::as_str), &bytes);

        Ok(ForwardedResponse {
            status,
            headers,
            body,
            unparsed_body,
        })
    }
}

fn build_upstream_request(
    req: &InboundRequest,
    target: ApiTarget,
    full_uri: &str,
) -> Result<Request<BoxBody<Bytes, hyper::Error>>, ForwardError> {
    let invalid = || ForwardError::InvalidUri {
        target,
        uri: full_uri.to_string(),
    };
    let uri: Uri = full_uri.parse().map_err(|_| invalid())?;

    let method = req.info.method.clone();
    let mut builder = Request::builder().method(method.clone()).uri(uri);
    for (key, value) in req.info.headers.iter() {
        if !is_hop_by_hop_request(key.as_str()) {
            builder = builder.header(key, value);
        }
    }

    let carries_body = method != Method::GET && method != Method::HEAD;
    let body = match (&req.json, carries_body) {
        (Some(json), true) => {
            if let Some(headers) = builder.headers_mut() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Bytes::from(json.to_string())
        }
        (None, true) => req.body.clone(),
        (_, false) => Bytes::new(),
    };

    builder
        .body(BoxBody::new(
            Full::new(body).map_err(|never: Infallible| match never {}),
        ))
        .map_err(|_| invalid())
}

/// Flatten a header map to one lowercase name per entry; repeated headers
/// are joined with `, `. `set-cookie` values are joined with a newline since
/// cookies may contain commas.
pub fn flatten_headers(headers: &hyper::HeaderMap) -> HeaderBag {
    let mut bag = HeaderBag::new();
    for name in headers.keys() {
        let separator = if name == SET_COOKIE { "\n" } else { ", " };
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(separator);
        bag.insert(name.as_str().to_string(), joined);
    }
    bag
}

/// JSON when the content type says so and the body parses, raw text otherwise.
///
/// The flag is set when the body was declared JSON but is kept as text, so
/// rendering can tell it apart from a JSON string document.
pub fn parse_body(content_type: Option<&str>, bytes: &[u8]) -> (serde_json::Value, bool) {
    let declared_json = content_type.map(is_json_content_type).unwrap_or(false);
    if declared_json && !bytes.is_empty() {
        match serde_json::from_slice(bytes) {
            Ok(value) => return (value, false),
            Err(e) => warn!("Upstream declared JSON but body did not parse: {}", e),
        }
    }
    let text = String::from_utf8_lossy(bytes).into_owned();
    (serde_json::Value::String(text), declared_json)
}

/// Render an error with its source chain, e.g. `client error (Connect): tcp
/// connect error: Connection refused`.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inbound(method: &str, uri: &str, headers: &[(&str, &str)], body: &'static str) -> InboundRequest {
        let mut builder = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        InboundRequest::new(builder.body(Bytes::from_static(body.as_bytes())).unwrap())
    }

    #[test]
    fn test_upstream_request_strips_framing_headers() {
        let req = inbound(
            "GET",
            "/panels/1?full=true",
            &[
                ("host", "localhost:3001"),
                ("connection", "keep-alive"),
                ("authorization", "Bearer abc"),
                ("x-customer-id", "42"),
            ],
            "",
        );
        let upstream =
            build_upstream_request(&req, ApiTarget::Golyzer, "http://up/panels/1?full=true")
                .unwrap();

        assert_eq!(upstream.uri(), "http://up/panels/1?full=true");
        assert!(upstream.headers().get("host").is_none());
        assert!(upstream.headers().get("connection").is_none());
        assert_eq!(upstream.headers()["authorization"], "Bearer abc");
        assert_eq!(upstream.headers()["x-customer-id"], "42");
    }

    #[tokio::test]
    async fn test_get_never_carries_body() {
        let req = inbound("GET", "/query", &[("content-type", "application/json")], r#"{"a":1}"#);
        let upstream = build_upstream_request(&req, ApiTarget::Data, "http://up/query").unwrap();
        let body = upstream.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_post_body_is_sent_as_json() {
        let req = inbound(
            "POST",
            "/authentication",
            &[("content-type", "application/json; charset=utf-8"), ("content-length", "25")],
            r#"{ "username" : "alice" }"#,
        );
        let upstream =
            build_upstream_request(&req, ApiTarget::Base, "http://up/authentication").unwrap();

        assert_eq!(upstream.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(upstream.headers().get_all(CONTENT_TYPE).iter().count(), 1);
        assert!(upstream.headers().get("content-length").is_none());
        let body = upstream.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"username":"alice"}"#);
    }

    #[tokio::test]
    async fn test_non_json_body_forwarded_raw() {
        let req = inbound("PUT", "/charts/1", &[("content-type", "text/csv")], "a,b\n1,2");
        let upstream = build_upstream_request(&req, ApiTarget::Golyzer, "http://up/charts/1").unwrap();
        assert_eq!(upstream.headers()[CONTENT_TYPE], "text/csv");
        let body = upstream.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"a,b\n1,2");
    }

    #[test]
    fn test_invalid_uri_is_reported() {
        let req = inbound("GET", "/me", &[], "");
        let err = build_upstream_request(&req, ApiTarget::Golyzer, "http://bad host/me").unwrap_err();
        assert!(matches!(err, ForwardError::InvalidUri { .. }));
    }

    #[test]
    fn test_flatten_headers_joins_repeats() {
        let mut headers = hyper::HeaderMap::new();
        headers.append("Vary", HeaderValue::from_static("origin"));
        headers.append("Vary", HeaderValue::from_static("accept"));
        headers.append("Set-Cookie", HeaderValue::from_static("a=1; Expires=Wed, 21 Oct 2026 07:28:00 GMT"));
        headers.append("Set-Cookie", HeaderValue::from_static("b=2"));
        headers.insert("Content-Type", HeaderValue::from_static("text/plain"));

        let bag = flatten_headers(&headers);
        assert_eq!(bag.get("vary").map(String::as_str), Some("origin, accept"));
        assert_eq!(
            bag.get("set-cookie").map(String::as_str),
            Some("a=1; Expires=Wed, 21 Oct 2026 07:28:00 GMT\nb=2")
        );
        assert_eq!(bag.get("content-type").map(String::as_str), Some("text/plain"));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(
            parse_body(Some("application/json"), br#"{"ok":true}"#),
            (json!({"ok": true}), false)
        );
        assert_eq!(
            parse_body(Some("application/json"), br#""hello""#),
            (json!("hello"), false)
        );
        assert_eq!(
            parse_body(Some("text/html"), b"<p>hi</p>"),
            (json!("<p>hi</p>"), false)
        );
        assert_eq!(
            parse_body(Some("application/json"), b"{broken"),
            (json!("{broken"), true)
        );
        assert_eq!(parse_body(Some("application/json"), b""), (json!(""), true));
        assert_eq!(parse_body(None, b"plain"), (json!("plain"), false));
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let outer = ForwardError::Unreachable {
            target: ApiTarget::Base,
            message: error_chain(&inner),
        };
        assert!(outer.to_string().contains("refused"));
    }
}
