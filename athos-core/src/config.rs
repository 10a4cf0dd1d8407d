//! Upload service configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 4.5 MiB, the request-body ceiling of the hosting platform.
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 4_718_592;

/// 25 MiB per file.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 25 * 1024 * 1024;

pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 10 * 60;

/// Limits and timers for chunked uploads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum size of a single chunk (and of a direct upload) in bytes.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: u64,
    /// Maximum size of an assembled file in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// How often the reaper sweeps idle sessions.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    /// Idle time after which a session is discarded.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Verify the assembled file against a client-supplied BLAKE3 digest.
    #[serde(default)]
    pub verify_checksums: bool,
}

impl UploadConfig {
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            max_chunk_bytes: default_max_chunk_bytes(),
            max_file_bytes: default_max_file_bytes(),
            reap_interval_secs: default_reap_interval_secs(),
            session_timeout_secs: default_session_timeout_secs(),
            verify_checksums: false,
        }
    }
}

fn default_max_chunk_bytes() -> u64 {
    DEFAULT_MAX_CHUNK_BYTES
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

fn default_reap_interval_secs() -> u64 {
    DEFAULT_REAP_INTERVAL_SECS
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}
