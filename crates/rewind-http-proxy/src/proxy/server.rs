//! ProxyServer struct and main run loop.
//!
//! The server owns all shared state (resolver, store, forwarder, fallback)
//! and hands a borrowed [`RequestHandlerContext`] to the handler for each
//! request.

use super::client::create_http_client;
use super::context::RequestHandlerContext;
use super::fallback::{BuiltinRoutes, Fallback};
use super::forwarding::Forwarder;
use super::handler::{handle_request, unreadable_body_response};
use super::target::TargetResolver;
use crate::config::ProxyConfig;
use crate::recording::{FileRecordingStore, RecordingStore};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// The main proxy server struct.
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    resolver: TargetResolver,
    store: Arc<dyn RecordingStore>,
    forwarder: Forwarder,
    fallback: Arc<dyn Fallback>,
}

impl ProxyServer {
    /// Create a server with the filesystem store under the configured
    /// recordings directory.
    ///
    /// `fallback` receives every request the proxy does not intercept; the
    /// built-in `/health` and `/metrics` routes are used when none is given.
    pub fn new(
        config: ProxyConfig,
        fallback: Option<Arc<dyn Fallback>>,
    ) -> Result<Self, anyhow::Error> {
        let store: Arc<dyn RecordingStore> =
            Arc::new(FileRecordingStore::new(config.recordings_dir.clone()));
        Self::with_store(config, store, fallback)
    }

    /// Create a server around an explicit recording store.
    pub fn with_store(
        config: ProxyConfig,
        store: Arc<dyn RecordingStore>,
        fallback: Option<Arc<dyn Fallback>>,
    ) -> Result<Self, anyhow::Error> {
        config.validate()?;
        let resolver = TargetResolver::with_defaults()?;

        let http_client = create_http_client(&config);
        let forwarder = Forwarder::new(
            http_client,
            config.upstreams.clone(),
            config.forward_timeout(),
        );
        let fallback = fallback
            .unwrap_or_else(|| Arc::new(BuiltinRoutes::new(config.mode)) as Arc<dyn Fallback>);

        Ok(Self {
            config: Arc::new(config),
            resolver,
            store,
            forwarder,
            fallback,
        })
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = self.config.listen.socket_addr();
        let listener = TcpListener::bind(addr).await?;
        self.run_with_listener(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        let addr = listener.local_addr()?;
        self.log_startup(addr);

        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { server.handle_request_internal(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(
                        "Error serving HTTP connection from {}: {}",
                        remote_addr, err
                    );
                }
            });
        }
    }

    fn log_startup(&self, addr: SocketAddr) {
        let upstreams = &self.config.upstreams;
        info!("Proxy mode: {}", self.config.mode);
        info!("Listening on http://{}", addr);
        info!("  base    -> {}", upstreams.base);
        info!("  golyzer -> {}", upstreams.golyzer);
        info!("  data    -> {}", upstreams.data);
        info!("Recordings directory: {}", self.config.recordings_dir.display());
        if upstreams.any_https() {
            debug!("TLS enabled for upstream calls");
        }
        match self.config.forward_timeout() {
            Some(limit) => info!("Upstream timeout: {}ms", limit.as_millis()),
            None => info!("Upstream timeout: disabled"),
        }
        for (prefix, target) in self.resolver.prefixes() {
            debug!("Intercepting {} -> {}", prefix, target);
        }
    }

    /// Buffer the body, build the context and delegate to the handler.
    async fn handle_request_internal(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
        let start_time = Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();

        let (parts, body) = req.into_parts();
        let response = match body.collect().await {
            Ok(collected) => {
                let req = Request::from_parts(parts, collected.to_bytes());
                let ctx = RequestHandlerContext {
                    mode: self.config.mode,
                    resolver: &self.resolver,
                    store: &self.store,
                    forwarder: &self.forwarder,
                    fallback: &self.fallback,
                };
                handle_request(&ctx, req).await
            }
            Err(e) => {
                error!("Failed to read request body for {} {}: {}", method, uri, e);
                unreadable_body_response(
                    &self.resolver,
                    &parts,
                    format!("Failed to read request body: {e}"),
                )
            }
        };

        info!(
            method = %method,
            url = %uri,
            status = response.status().as_u16(),
            response_time_ms = start_time.elapsed().as_millis() as u64,
            "request completed"
        );

        Ok(response)
    }
}
