//! Upstream targets and the path-prefix resolver.

use crate::error::ConfigError;
use std::fmt;

/// Logical upstream backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiTarget {
    Base,
    Golyzer,
    Data,
}

impl ApiTarget {
    pub const ALL: [ApiTarget; 3] = [ApiTarget::Base, ApiTarget::Golyzer, ApiTarget::Data];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiTarget::Base => "base",
            ApiTarget::Golyzer => "golyzer",
            ApiTarget::Data => "data",
        }
    }
}

impl fmt::Display for ApiTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intercepted prefixes and the target each one maps to.
pub const DEFAULT_PREFIXES: &[(&str, ApiTarget)] = &[
    ("/authentication", ApiTarget::Base),
    ("/v1/", ApiTarget::Base),
    ("/query", ApiTarget::Data),
    ("/me", ApiTarget::Golyzer),
    ("/panels", ApiTarget::Golyzer),
    ("/charts", ApiTarget::Golyzer),
    ("/authorization", ApiTarget::Golyzer),
];

/// Maps request paths to targets by fixed prefix.
///
/// Prefixes are checked for overlap at construction, so at most one prefix
/// can match any path and resolution order is irrelevant.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    prefixes: Vec<(String, ApiTarget)>,
}

impl TargetResolver {
    pub fn new<I, S>(prefixes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, ApiTarget)>,
        S: Into<String>,
    {
        let prefixes: Vec<(String, ApiTarget)> = prefixes
            .into_iter()
            .map(|(p, t)| (p.into(), t))
            .collect();

        for (i, (prefix, target)) in prefixes.iter().enumerate() {
            if prefix.is_empty() {
                return Err(ConfigError::EmptyPrefix(*target));
            }
            for (other, _) in &prefixes[i + 1..] {
                if prefix.starts_with(other.as_str()) || other.starts_with(prefix.as_str()) {
                    return Err(ConfigError::OverlappingPrefixes {
                        first: prefix.clone(),
                        second: other.clone(),
                    });
                }
            }
        }

        Ok(Self { prefixes })
    }

    /// Resolver over [`DEFAULT_PREFIXES`].
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(DEFAULT_PREFIXES.iter().copied())
    }

    /// Target for a request path, or `None` when the path is not intercepted.
    pub fn resolve(&self, path: &str) -> Option<ApiTarget> {
        self.prefixes
            .iter()
            .find(|(prefix, _)| matches_prefix(path, prefix))
            .map(|(_, target)| *target)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = (&str, ApiTarget)> {
        self.prefixes.iter().map(|(p, t)| (p.as_str(), *t))
    }
}

/// Prefix match on a segment boundary: `/me` covers `/me` and `/me/x` but
/// not `/metrics`. A prefix ending in `/` is its own boundary.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
