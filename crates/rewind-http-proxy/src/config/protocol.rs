//! Upstream URL schemes.

/// Scheme of an upstream base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    /// HTTP over TLS
    Https,
}

impl Protocol {
    /// Parse protocol from URL scheme
    pub fn from_scheme(scheme: &str) -> Result<Self, String> {
        match scheme.to_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(format!("Unsupported protocol scheme: {scheme}")),
        }
    }

    /// Extract the protocol from a full URL.
    pub fn from_url(url: &str) -> Result<Self, String> {
        match url.split_once("://") {
            Some((scheme, _)) => Self::from_scheme(scheme),
            None => Err(format!("Invalid URL format (missing scheme): {url}")),
        }
    }
}
