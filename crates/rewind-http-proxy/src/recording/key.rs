//! Recording key derivation.
//!
//! A key is `<target>-api/<sanitizedEndpoint>_<METHOD>[_<digest>]`. The
//! digest is only added for mutating methods so idempotent resources keep a
//! single fixture. Two distinct bodies can only share a key through a
//! collision of the truncated digest (32 bits of SHA-256), which is accepted.

use crate::proxy::ApiTarget;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Number of hex characters kept from the body digest.
pub const BODY_DIGEST_LEN: usize = 8;

/// Stable, filesystem-safe identity of a recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordingKey {
    target: ApiTarget,
    stem: String,
}

impl RecordingKey {
    /// Directory (relative to the recordings root) holding this key.
    pub fn dir_name(&self) -> String {
        format!("{}-api", self.target.as_str())
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.stem)
    }

    /// Path relative to the recordings root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.dir_name()).join(self.file_name())
    }
}

impl fmt::Display for RecordingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dir_name(), self.file_name())
    }
}

/// Build the storage key for an exchange.
pub fn build_key(
    target: ApiTarget,
    endpoint: &str,
    method: &str,
    request_body: Option<&serde_json::Value>,
) -> RecordingKey {
    let method = method.to_ascii_uppercase();
    let mut stem = format!("{}_{}", sanitize_endpoint(endpoint), method);

    if is_mutating(&method) {
        if let Some(digest) = request_body.and_then(body_digest) {
            stem.push('_');
            stem.push_str(&digest);
        }
    }

    RecordingKey { target, stem }
}

/// Strip one leading `/`, flatten separators to `_` and replace anything
/// outside `[A-Za-z0-9_-]` with `-`.
pub fn sanitize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.strip_prefix('/').unwrap_or(endpoint);
    trimmed
        .chars()
        .map(|c| match c {
            '/' => '_',
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => c,
            _ => '-',
        })
        .collect()
}

/// Methods whose payload participates in the key.
pub fn is_mutating(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH"
    )
}

/// Short hex digest of a body, or `None` when the body counts as absent.
///
/// `null`, `false`, `0` and `""` count as absent. Strings are hashed as their
/// raw text, every other value as compact JSON. `serde_json` maps keep keys
/// sorted, so equal objects hash equally.
pub fn body_digest(body: &serde_json::Value) -> Option<String> {
    let canonical = match body {
        serde_json::Value::Null | serde_json::Value::Bool(false) => return None,
        serde_json::Value::Number(n) if n.as_f64() == Some(0.0) => return None,
        serde_json::Value::String(s) if s.is_empty() => return None,
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let hash = Sha256::digest(canonical.as_bytes());
    let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
    Some(hex[..BODY_DIGEST_LEN].to_string())
}
