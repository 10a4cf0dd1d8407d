//! Core data types for the upload service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Mutex;

/// Longest accepted client-supplied identifier.
pub const MAX_ID_LEN: usize = 256;

/// Client-supplied upload session identifier (the `fileId` field)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id with validation. The value is untrusted input.
    pub fn new(id: &str) -> crate::Result<Self> {
        validate_identifier("fileId", id)?;
        Ok(SessionId(id.to_string()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the business record a document is attached to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerRecordId(String);

impl OwnerRecordId {
    pub fn new(id: &str) -> crate::Result<Self> {
        validate_identifier("ownerRecordId", id)?;
        Ok(OwnerRecordId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_identifier(field: &'static str, value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::AthosError::MissingField(field));
    }

    if value.len() > MAX_ID_LEN {
        return Err(crate::AthosError::InvalidField {
            field,
            reason: format!("longer than {} bytes", MAX_ID_LEN),
        });
    }

    if value.chars().any(|c| c.is_control()) {
        return Err(crate::AthosError::InvalidField {
            field,
            reason: "control characters not allowed".to_string(),
        });
    }

    Ok(())
}

static ID_GENERATOR: Mutex<ulid::Generator> = Mutex::new(ulid::Generator::new());

/// Document identifier using ULID for time-ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(ulid::Ulid);

impl DocumentId {
    /// Generate a new id with current timestamp.
    ///
    /// Ids from one process are strictly increasing, also within a millisecond.
    pub fn new() -> Self {
        let mut generator = ID_GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
        // Overflow needs 2^80 ids in one millisecond.
        DocumentId(generator.generate().unwrap_or_else(|_| ulid::Ulid::new()))
    }

    pub fn from_ulid(ulid: ulid::Ulid) -> Self {
        DocumentId(ulid)
    }

    pub fn as_ulid(&self) -> ulid::Ulid {
        self.0
    }

    /// Millisecond timestamp component
    pub fn timestamp(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = crate::AthosError;

    fn from_str(s: &str) -> crate::Result<Self> {
        ulid::Ulid::from_string(s)
            .map(DocumentId)
            .map_err(|e| crate::AthosError::InvalidField {
                field: "documentId",
                reason: e.to_string(),
            })
    }
}

/// Content hash for integrity verification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create hash from data using BLAKE3
    pub fn new(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        ContentHash(hash.into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ContentHash(bytes)
    }

    /// Parse a 64-character hex digest
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let hash = blake3::Hash::from_hex(s.trim()).map_err(|e| crate::AthosError::InvalidField {
            field: "checksum",
            reason: format!("'{}' is not a BLAKE3 hex digest: {}", s, e),
        })?;
        Ok(ContentHash(hash.into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Get hash as hex string
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// File metadata captured from the first chunk of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub target_file_name: String,
    pub content_type: String,
    pub owner_record_id: OwnerRecordId,
    pub destination_folder: Option<String>,
    /// BLAKE3 digest of the whole file, checked only when verification is on
    pub expected_checksum: Option<ContentHash>,
}

impl UploadMetadata {
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";

    pub fn new(target_file_name: impl Into<String>, owner_record_id: OwnerRecordId) -> Self {
        UploadMetadata {
            target_file_name: target_file_name.into(),
            content_type: Self::DEFAULT_CONTENT_TYPE.to_string(),
            owner_record_id,
            destination_folder: None,
            expected_checksum: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.destination_folder = Some(folder.into());
        self
    }

    pub fn with_checksum(mut self, checksum: ContentHash) -> Self {
        self.expected_checksum = Some(checksum);
        self
    }
}

/// Document record owned by the relational store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDocument {
    pub id: DocumentId,
    pub owner_record_id: OwnerRecordId,
    pub file_name: String,
    pub url: String,
    pub folder: Option<String>,
    pub size_bytes: u64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// Insert request for a document record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub owner_record_id: OwnerRecordId,
    pub name: String,
    pub url: String,
    pub folder: Option<String>,
    pub size: u64,
    pub content_type: String,
}

impl NewDocument {
    /// Materialize the record with a fresh id
    pub fn into_document(self) -> PublishedDocument {
        PublishedDocument {
            id: DocumentId::new(),
            owner_record_id: self.owner_record_id,
            file_name: self.name,
            url: self.url,
            folder: self.folder,
            size_bytes: self.size,
            content_type: self.content_type,
            created_at: Utc::now(),
        }
    }
}

/// Object written to the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// Terminal result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedUpload {
    pub url: String,
    pub name: String,
    pub folder_name: Option<String>,
    pub document_id: DocumentId,
    pub size_bytes: u64,
}

/// Result of one accepted chunk submission
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// More slots are missing. `progress` is a percentage in `0..=100`.
    Progress {
        progress: f64,
        filled: u32,
        expected: u32,
    },
    Complete(CompletedUpload),
}

impl ChunkOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, ChunkOutcome::Complete(_))
    }
}

/// JSON body returned for every upload request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl UploadResponse {
    pub fn completed(upload: &CompletedUpload) -> Self {
        UploadResponse {
            success: true,
            complete: Some(true),
            url: Some(upload.url.clone()),
            name: Some(upload.name.clone()),
            folder_name: upload.folder_name.clone(),
            document_id: Some(upload.document_id.to_string()),
            ..Default::default()
        }
    }

    pub fn from_outcome(outcome: &ChunkOutcome) -> Self {
        match outcome {
            ChunkOutcome::Progress { progress, .. } => UploadResponse {
                success: true,
                complete: Some(false),
                progress: Some(*progress),
                ..Default::default()
            },
            ChunkOutcome::Complete(upload) => Self::completed(upload),
        }
    }

    pub fn failed(error: &crate::AthosError) -> Self {
        UploadResponse {
            success: false,
            error: Some(error.to_string()),
            kind: Some(error.kind().to_string()),
            ..Default::default()
        }
    }
}

/// Header names carrying chunk submission fields over HTTP
pub mod headers {
    pub const FILE_ID: &str = "x-athos-file-id";
    pub const CHUNK_INDEX: &str = "x-athos-chunk-index";
    pub const TOTAL_CHUNKS: &str = "x-athos-total-chunks";
    /// Percent-encoded UTF-8
    pub const FILE_NAME: &str = "x-athos-file-name";
    pub const FILE_TYPE: &str = "x-athos-file-type";
    pub const OWNER_RECORD_ID: &str = "x-athos-owner-record-id";
    /// Percent-encoded UTF-8
    pub const FOLDER_NAME: &str = "x-athos-folder-name";
    pub const CHECKSUM: &str = "x-athos-checksum";
}
