//! Runtime settings shared by every plan in a run

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CACHE_DIR: &str = ".cache";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding cached page sources
    pub cache_dir: PathBuf,
    /// How long a cached source stays fresh
    pub cache_ttl: Duration,
    /// Global timeout for a single HTTP request
    pub timeout: Duration,
    /// Sent unless the plan sets its own `User-Agent` header
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: default_user_agent(),
        }
    }
}

pub fn default_user_agent() -> String {
    format!("hap/{}", env!("CARGO_PKG_VERSION"))
}
