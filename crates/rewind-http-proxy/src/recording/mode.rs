//! Proxy recording mode definitions.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Proxy mode, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyMode {
    /// Serve existing recordings, forward and record on a miss
    Record,
    /// Always forward, overwriting any existing recording
    ForceRecord,
    /// Serve recordings only, never contact the upstream
    #[default]
    Replay,
    /// Always forward, never touch recordings
    Passthrough,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::Record => "record",
            ProxyMode::ForceRecord => "force-record",
            ProxyMode::Replay => "replay",
            ProxyMode::Passthrough => "passthrough",
        }
    }

    /// Whether stored recordings are consulted before forwarding.
    pub fn reads_recordings(&self) -> bool {
        matches!(self, ProxyMode::Record | ProxyMode::Replay)
    }

    /// Whether a successful forward is archived.
    pub fn writes_recordings(&self) -> bool {
        matches!(self, ProxyMode::Record | ProxyMode::ForceRecord)
    }

    /// Whether the upstream may be contacted at all.
    pub fn forwards(&self) -> bool {
        !matches!(self, ProxyMode::Replay)
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(ProxyMode::Record),
            "force-record" | "force_record" => Ok(ProxyMode::ForceRecord),
            "replay" => Ok(ProxyMode::Replay),
            "passthrough" => Ok(ProxyMode::Passthrough),
            _ => Err(ConfigError::InvalidMode(s.to_string())),
        }
    }
}
