//! HTTP client creation and configuration.
//!
//! One pooled HTTP/1.1 client is shared by every forward.

use crate::config::ProxyConfig;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::{info, warn};

/// Type alias for the HTTP client used by the proxy.
pub type HttpClient =
    Client<hyper_rustls::HttpsConnector<HttpConnector>, BoxBody<Bytes, hyper::Error>>;

/// Create a shared HTTP client with connection pooling.
///
/// Uses the platform root certificates, or the bundled webpki roots when the
/// platform store cannot be loaded.
pub fn create_http_client(config: &ProxyConfig) -> HttpClient {
    let pool = &config.connection_pool;

    // Another crate in the process may already have installed a provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(pool.keepalive_timeout_secs)));
    http_connector.set_connect_timeout(Some(Duration::from_secs(pool.connect_timeout_secs)));
    http_connector.enforce_http(false); // Allow both HTTP and HTTPS

    let roots = match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
        Ok(builder) => builder,
        Err(e) => {
            warn!("Native root certificates unavailable ({}), using webpki roots", e);
            hyper_rustls::HttpsConnectorBuilder::new().with_webpki_roots()
        }
    };
    let https_connector = roots
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    let http_client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .build(https_connector);

    info!(
        "Connection pool configured (HTTP/1.1): max_idle={}, idle_timeout={}s, connect_timeout={}s",
        pool.max_idle_per_host, pool.idle_timeout_secs, pool.connect_timeout_secs
    );

    http_client
}
