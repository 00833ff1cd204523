//! CORS header synthesis for intercepted requests.
//!
//! Applied to every intercepted response, errors included, so a browser
//! caller always sees the real status instead of a CORS failure.

use super::response_ext::ResponseExt;
use http_body_util::combinators::BoxBody;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use hyper::{Response, StatusCode};

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";

pub const DEFAULT_ALLOWED_HEADERS: &str = "Authorization, Content-Type, X-Customer-ID, \
X-Query-Format, X-App-Name, X-Request-ID, X-Builder-Mode, X-Span-Attributes";

/// CORS-relevant view of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct CorsRequest {
    pub origin: Option<HeaderValue>,
    pub request_headers: Option<HeaderValue>,
    pub request_method: Option<HeaderValue>,
}

impl CorsRequest {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            origin: non_empty(headers.get(ORIGIN)),
            request_headers: non_empty(headers.get(ACCESS_CONTROL_REQUEST_HEADERS)),
            request_method: non_empty(headers.get(ACCESS_CONTROL_REQUEST_METHOD)),
        }
    }
}

fn non_empty(value: Option<&HeaderValue>) -> Option<HeaderValue> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// Write CORS headers onto a response header map.
pub fn apply_cors(cors: &CorsRequest, headers: &mut HeaderMap, preflight: bool) {
    match &cors.origin {
        Some(origin) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            add_vary_origin(headers);
        }
        None => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
    }

    let allow_headers = cors
        .request_headers
        .clone()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);

    let allow_methods = match (&cors.request_method, preflight) {
        (Some(method), false) => method.clone(),
        _ => HeaderValue::from_static(ALLOWED_METHODS),
    };
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, allow_methods);
}

fn add_vary_origin(headers: &mut HeaderMap) {
    let already = headers.get_all(VARY).iter().any(|v| {
        v.to_str()
            .map(|s| {
                s.split(',')
                    .any(|part| part.trim().eq_ignore_ascii_case("origin"))
            })
            .unwrap_or(false)
    });
    if !already {
        headers.append(VARY, HeaderValue::from_static("origin"));
    }
}

/// Short-circuit response for an intercepted `OPTIONS` request.
pub fn preflight_response(cors: &CorsRequest) -> Response<BoxBody<Bytes, hyper::Error>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    apply_cors(cors, response.headers_mut(), true);
    response.into_boxed()
}
