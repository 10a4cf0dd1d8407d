//! Which files may be uploaded, and how

use crate::{ClientError, Result};

pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".jpg", ".jpeg", ".png", ".doc", ".docx", ".txt"];

/// 25 MiB
pub const DEFAULT_MAX_FILE_BYTES: u64 = 25 * 1024 * 1024;

/// Files up to 4.5 MiB go in one request
pub const DEFAULT_DIRECT_THRESHOLD: u64 = 4_718_592;

/// 4 MiB, below the server's per-request ceiling
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// How the client splits and screens files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Lowercase, dot-prefixed
    pub allowed_extensions: Vec<String>,
    pub max_file_bytes: u64,
    pub direct_threshold: u64,
    pub chunk_size: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        UploadPolicy {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            direct_threshold: DEFAULT_DIRECT_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl UploadPolicy {
    /// Reject empty, oversized and wrongly typed files
    pub fn check(&self, file_name: &str, size: u64) -> Result<()> {
        if size == 0 {
            return Err(ClientError::Policy(format!("{} is empty", file_name)));
        }

        if size > self.max_file_bytes {
            return Err(ClientError::Policy(format!(
                "{} is {} bytes, the limit is {} bytes",
                file_name, size, self.max_file_bytes
            )));
        }

        let extension = file_name
            .rfind('.')
            .map(|i| file_name[i..].to_ascii_lowercase())
            .unwrap_or_default();

        if !self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            return Err(ClientError::Policy(format!(
                "{} has an unsupported type, allowed: {}",
                file_name,
                self.allowed_extensions.join(" ")
            )));
        }

        Ok(())
    }

    /// Whether a file of `size` bytes needs the chunked path
    pub fn should_chunk(&self, size: u64) -> bool {
        size > self.direct_threshold
    }
}
