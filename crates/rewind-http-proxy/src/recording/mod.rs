//! Recording of upstream exchanges for record/replay.
//!
//! Supports four modes:
//! - `record`: Replay an existing recording, otherwise forward and record
//! - `force-record`: Always forward, overwrite the recording
//! - `replay`: Only replay, never forward
//! - `passthrough`: Always forward, never record
//!
//! # Module Structure
//!
//! - `mode` - Proxy mode enum
//! - `types` - Recording and header bag types
//! - `key` - Storage key derivation
//! - `store` - Recording store trait and filesystem implementation

mod key;
mod mode;
mod store;
mod types;

pub use key::{body_digest, build_key, is_mutating, sanitize_endpoint, RecordingKey};
pub use mode::ProxyMode;
pub use store::{FileRecordingStore, RecordingStore};
pub use types::{is_json_content_type, parse_query, HeaderBag, Recording};
