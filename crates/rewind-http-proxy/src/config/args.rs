//! Command-line flags, each backed by an environment variable.

use super::listen::{default_host, default_port};
use super::upstream::{
    default_connect_timeout, default_pool_idle_timeout, default_pool_max_idle_per_host,
};
use super::{
    default_forward_timeout_ms, ConnectionPoolConfig, ListenConfig, ProxyConfig, UpstreamUrls,
    DEFAULT_BASE_API_URL, DEFAULT_DATA_API_URL, DEFAULT_GOLYZER_API_URL,
};
use crate::error::ConfigError;
use crate::recording::ProxyMode;
use clap::{Parser, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Rewind: record/replay proxy for upstream HTTP APIs
#[derive(Parser, Debug, Clone)]
#[command(name = "rewind-http-proxy")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Proxy mode: record, force-record, replay or passthrough
    #[arg(long, env = "PROXY_MODE", default_value = "replay")]
    pub mode: String,

    /// Base URL of the base (authentication / v1) API
    #[arg(long, env = "BASE_API_URL", default_value = DEFAULT_BASE_API_URL)]
    pub base_api_url: String,

    /// Base URL of the golyzer (panels / charts / users) API
    #[arg(long, env = "GOLYZER_API_URL", default_value = DEFAULT_GOLYZER_API_URL)]
    pub golyzer_api_url: String,

    /// Base URL of the data (query) API
    #[arg(long, env = "DATA_API_URL", default_value = DEFAULT_DATA_API_URL)]
    pub data_api_url: String,

    /// Root directory for recordings
    #[arg(long, env = "RECORDINGS_DIR", default_value = "recordings")]
    pub recordings_dir: PathBuf,

    /// Address to listen on
    #[arg(long, env = "HOST", default_value_t = default_host())]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = default_port())]
    pub port: u16,

    /// Timeout for one upstream call in milliseconds (0 disables)
    #[arg(long, env = "FORWARD_TIMEOUT_MS", default_value_t = default_forward_timeout_ms())]
    pub forward_timeout_ms: u64,

    /// Upstream connect timeout in seconds
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = default_connect_timeout())]
    pub connect_timeout_secs: u64,

    /// Maximum idle pooled connections per upstream host
    #[arg(long, env = "POOL_MAX_IDLE_PER_HOST", default_value_t = default_pool_max_idle_per_host())]
    pub pool_max_idle_per_host: usize,

    /// Idle pooled connection timeout in seconds
    #[arg(long, env = "POOL_IDLE_TIMEOUT_SECS", default_value_t = default_pool_idle_timeout())]
    pub pool_idle_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl CliArgs {
    /// Build and validate the proxy configuration.
    pub fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mode: ProxyMode = self.mode.parse()?;
        let config = ProxyConfig {
            mode,
            upstreams: UpstreamUrls {
                base: self.base_api_url,
                golyzer: self.golyzer_api_url,
                data: self.data_api_url,
            },
            recordings_dir: self.recordings_dir,
            listen: ListenConfig {
                host: self.host,
                port: self.port,
            },
            connection_pool: ConnectionPoolConfig {
                max_idle_per_host: self.pool_max_idle_per_host,
                idle_timeout_secs: self.pool_idle_timeout_secs,
                connect_timeout_secs: self.connect_timeout_secs,
                ..Default::default()
            },
            forward_timeout_ms: self.forward_timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_build_config() {
        let args = CliArgs::try_parse_from([
            "rewind-http-proxy",
            "--mode",
            "record",
            "--base-api-url",
            "http://127.0.0.1:9001",
            "--golyzer-api-url",
            "http://127.0.0.1:9002/",
            "--data-api-url",
            "http://127.0.0.1:9003",
            "--recordings-dir",
            "/tmp/rewind",
            "--port",
            "4000",
            "--forward-timeout-ms",
            "1500",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.mode, ProxyMode::Record);
        assert_eq!(
            config.upstreams.url_for(crate::proxy::ApiTarget::Golyzer),
            "http://127.0.0.1:9002"
        );
        assert_eq!(config.recordings_dir, PathBuf::from("/tmp/rewind"));
        assert_eq!(config.listen.port, 4000);
        assert_eq!(config.forward_timeout_ms, 1500);
    }

    #[test]
    fn test_invalid_mode_is_startup_error() {
        let args =
            CliArgs::try_parse_from(["rewind-http-proxy", "--mode", "sometimes"]).unwrap();
        assert!(matches!(
            args.into_config(),
            Err(ConfigError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_invalid_upstream_is_startup_error() {
        let args = CliArgs::try_parse_from([
            "rewind-http-proxy",
            "--mode",
            "replay",
            "--data-api-url",
            "not a url",
        ])
        .unwrap();
        assert!(matches!(
            args.into_config(),
            Err(ConfigError::InvalidUpstream { .. })
        ));
    }
}
