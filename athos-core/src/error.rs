//! Error types for the upload service

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AthosError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid chunk payload: expected binary data, got {0}")]
    InvalidPayloadType(String),

    #[error("Chunk too large: {size} bytes (maximum {max} bytes per chunk)")]
    ChunkTooLarge { size: u64, max: u64 },

    #[error("Invalid chunk index: {index} (expected 0..{total})")]
    InvalidChunkIndex { index: String, total: u32 },

    #[error("Empty file (0 bytes)")]
    EmptyFile,

    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Upload session {session_id} is incomplete, missing chunks {missing:?}")]
    IncompleteSession { session_id: String, missing: Vec<u32> },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Storage error, file was not uploaded: {0}")]
    Storage(String),

    /// The blob exists in storage but has no document record pointing at it.
    #[error("File was uploaded to {url} but could not be linked to its record: {reason}")]
    Record { url: String, reason: String },

    #[error("Failed to assemble upload: {0}")]
    AssemblyFailed(#[source] Box<AthosError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AthosError {
    /// Wrap an assembler or publisher failure.
    pub fn assembly(inner: AthosError) -> Self {
        AthosError::AssemblyFailed(Box::new(inner))
    }

    /// Stable machine-readable name for the wire layer.
    ///
    /// `AssemblyFailed` reports the kind of the failure it wraps, so callers
    /// can tell an orphaned upload (`record_error`) from a total failure.
    pub fn kind(&self) -> &'static str {
        match self {
            AthosError::MissingField(_) => "missing_field",
            AthosError::InvalidField { .. } => "invalid_field",
            AthosError::InvalidPayloadType(_) => "invalid_payload_type",
            AthosError::ChunkTooLarge { .. } => "chunk_too_large",
            AthosError::InvalidChunkIndex { .. } => "invalid_chunk_index",
            AthosError::EmptyFile => "empty_file",
            AthosError::FileTooLarge { .. } => "file_too_large",
            AthosError::IncompleteSession { .. } => "incomplete_session",
            AthosError::ChecksumMismatch { .. } => "checksum_mismatch",
            AthosError::Storage(_) => "storage_error",
            AthosError::Record { .. } => "record_error",
            AthosError::AssemblyFailed(inner) => inner.kind(),
            AthosError::NotFound(_) => "not_found",
            AthosError::Serialization(_) | AthosError::Io(_) | AthosError::Unknown(_) => {
                "unknown_error"
            }
        }
    }

    /// True for errors caused by the caller's input rather than the service.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AthosError::MissingField(_)
                | AthosError::InvalidField { .. }
                | AthosError::InvalidPayloadType(_)
                | AthosError::ChunkTooLarge { .. }
                | AthosError::InvalidChunkIndex { .. }
                | AthosError::EmptyFile
                | AthosError::FileTooLarge { .. }
        )
    }

    /// The innermost error, unwrapping `AssemblyFailed`.
    pub fn root(&self) -> &AthosError {
        match self {
            AthosError::AssemblyFailed(inner) => inner.root(),
            other => other,
        }
    }
}
