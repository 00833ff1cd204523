//! Configuration types for the Rewind proxy.
//!
//! Configuration is read once at startup (flags backed by environment
//! variables, see [`CliArgs`]) and is immutable afterwards.

mod args;
mod listen;
mod protocol;
mod upstream;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::recording::ProxyMode;

pub use args::{CliArgs, LogFormat};
pub use listen::ListenConfig;
pub use protocol::Protocol;
pub use upstream::{
    ConnectionPoolConfig, UpstreamUrls, DEFAULT_BASE_API_URL, DEFAULT_DATA_API_URL,
    DEFAULT_GOLYZER_API_URL,
};

/// Process-wide proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub mode: ProxyMode,
    pub upstreams: UpstreamUrls,
    pub recordings_dir: PathBuf,
    pub listen: ListenConfig,
    pub connection_pool: ConnectionPoolConfig,
    /// Upper bound for one upstream call; 0 disables the timeout
    pub forward_timeout_ms: u64,
}

fn default_recordings_dir() -> PathBuf {
    PathBuf::from("recordings")
}

pub(crate) fn default_forward_timeout_ms() -> u64 {
    30_000
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mode: ProxyMode::default(),
            upstreams: UpstreamUrls::default(),
            recordings_dir: default_recordings_dir(),
            listen: ListenConfig::default(),
            connection_pool: ConnectionPoolConfig::default(),
            forward_timeout_ms: default_forward_timeout_ms(),
        }
    }
}

impl ProxyConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.upstreams.validate()?;
        if self.recordings_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRecordingsDir);
        }
        Ok(())
    }

    pub fn forward_timeout(&self) -> Option<Duration> {
        (self.forward_timeout_ms > 0).then(|| Duration::from_millis(self.forward_timeout_ms))
    }
}
