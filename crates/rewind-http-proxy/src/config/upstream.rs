//! Upstream and connection pool configuration.

use super::protocol::Protocol;
use crate::error::ConfigError;
use crate::proxy::ApiTarget;

pub const DEFAULT_BASE_API_URL: &str = "https://edge-api-base-platform.dev.goapice.com";
pub const DEFAULT_GOLYZER_API_URL: &str = "https://edge-api-painel-de-controle.dev.goapice.com";
pub const DEFAULT_DATA_API_URL: &str = "https://api-bi-engine.dev.goapice.com";

/// Base URL of each logical target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamUrls {
    pub base: String,
    pub golyzer: String,
    pub data: String,
}

impl Default for UpstreamUrls {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_API_URL.to_string(),
            golyzer: DEFAULT_GOLYZER_API_URL.to_string(),
            data: DEFAULT_DATA_API_URL.to_string(),
        }
    }
}

impl UpstreamUrls {
    /// Base URL for a target, without a trailing slash.
    pub fn url_for(&self, target: ApiTarget) -> &str {
        let url = match target {
            ApiTarget::Base => &self.base,
            ApiTarget::Golyzer => &self.golyzer,
            ApiTarget::Data => &self.data,
        };
        url.trim_end_matches('/')
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for target in ApiTarget::ALL {
            let url = self.url_for(target);
            if url.is_empty() {
                return Err(ConfigError::InvalidUpstream {
                    target,
                    reason: "URL is empty".to_string(),
                });
            }
            Protocol::from_url(url)
                .map_err(|reason| ConfigError::InvalidUpstream { target, reason })?;
            if url.parse::<hyper::Uri>().is_err() {
                return Err(ConfigError::InvalidUpstream {
                    target,
                    reason: format!("'{url}' is not a valid URI"),
                });
            }
        }
        Ok(())
    }

    /// Whether any upstream needs TLS.
    pub fn any_https(&self) -> bool {
        ApiTarget::ALL
            .iter()
            .any(|t| Protocol::from_url(self.url_for(*t)) == Ok(Protocol::Https))
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout_secs: u64,
    pub keepalive_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

pub(crate) fn default_pool_max_idle_per_host() -> usize {
    100
}

pub(crate) fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_keepalive_timeout() -> u64 {
    60
}

pub(crate) fn default_connect_timeout() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let urls = UpstreamUrls {
            base: "http://localhost:9000/".to_string(),
            ..Default::default()
        };
        assert_eq!(urls.url_for(ApiTarget::Base), "http://localhost:9000");
        assert_eq!(urls.url_for(ApiTarget::Data), DEFAULT_DATA_API_URL);
    }

    #[test]
    fn test_defaults_validate() {
        let urls = UpstreamUrls::default();
        assert!(urls.validate().is_ok());
        assert!(urls.any_https());
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        let urls = UpstreamUrls {
            golyzer: "ftp://example.com".to_string(),
            ..Default::default()
        };
        let err = urls.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidUpstream {
                target: ApiTarget::Golyzer,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_url_rejected() {
        let urls = UpstreamUrls {
            data: String::new(),
            ..Default::default()
        };
        assert!(urls.validate().is_err());
    }

    #[test]
    fn test_pool_defaults() {
        let pool = ConnectionPoolConfig::default();
        assert_eq!(pool.max_idle_per_host, 100);
        assert_eq!(pool.connect_timeout_secs, 5);
    }
}
