//! Record/replay HTTP proxy.
//!
//! Forwards intercepted API calls to their upstream and archives the
//! exchanges as JSON files, or replays those files with no network access.

pub mod config;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod recording;
