//! Publishing assembled files to object storage and the document store

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info};
use athos_core::*;

/// Options for an object store write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// Readable by anyone holding the URL
    pub public: bool,
    /// Append a random suffix so equal names never collide
    pub unique_suffix: bool,
    pub content_type: String,
}

impl PutOptions {
    pub fn public_unique(content_type: impl Into<String>) -> Self {
        PutOptions {
            public: true,
            unique_suffix: true,
            content_type: content_type.into(),
        }
    }
}

/// Blob storage returning a public URL per object
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn put(&self, name: &str, data: Bytes, options: &PutOptions) -> Result<StoredObject>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
}

/// Row-level access to document records
#[async_trait]
pub trait DocumentRepository: Send + Sync + 'static {
    async fn insert_document(&self, document: NewDocument) -> Result<PublishedDocument>;

    /// Newest first
    async fn list_by_owner(&self, owner: &OwnerRecordId) -> Result<Vec<PublishedDocument>>;

    /// Returns false when no record had this id
    async fn remove(&self, id: DocumentId) -> Result<bool>;

    /// Remove every record of `owner` filed under `folder`; returns the count
    async fn remove_folder(&self, owner: &OwnerRecordId, folder: &str) -> Result<usize>;
}

/// Uploads a file and links it to its owner record
#[derive(Clone)]
pub struct Publisher {
    objects: Arc<dyn ObjectStore>,
    documents: Arc<dyn DocumentRepository>,
}

impl Publisher {
    pub fn new(objects: Arc<dyn ObjectStore>, documents: Arc<dyn DocumentRepository>) -> Self {
        Publisher { objects, documents }
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn documents(&self) -> &Arc<dyn DocumentRepository> {
        &self.documents
    }

    /// Store `data` then insert its document record.
    ///
    /// A storage failure yields `Storage` and records nothing. A record
    /// failure after a successful store yields `Record`; the blob stays in
    /// storage unreferenced and is neither retried nor deleted.
    pub async fn publish(&self, data: Bytes, metadata: &UploadMetadata) -> Result<CompletedUpload> {
        let size = data.len() as u64;
        let options = PutOptions::public_unique(metadata.content_type.clone());

        let stored = self
            .objects
            .put(&metadata.target_file_name, data, &options)
            .await
            .map_err(|e| {
                error!(file = %metadata.target_file_name, error = %e, "Object store upload failed");
                match e {
                    AthosError::Storage(_) => e,
                    other => AthosError::Storage(other.to_string()),
                }
            })?;

        info!(file = %metadata.target_file_name, url = %stored.url, size, "Stored upload");

        let record = NewDocument {
            owner_record_id: metadata.owner_record_id.clone(),
            name: metadata.target_file_name.clone(),
            url: stored.url.clone(),
            folder: metadata.destination_folder.clone(),
            size,
            content_type: metadata.content_type.clone(),
        };

        let document = self.documents.insert_document(record).await.map_err(|e| {
            error!(
                url = %stored.url,
                owner = %metadata.owner_record_id,
                error = %e,
                "Document record insert failed, blob is orphaned"
            );
            AthosError::Record {
                url: stored.url.clone(),
                reason: e.to_string(),
            }
        })?;

        info!(document_id = %document.id, owner = %document.owner_record_id, "Recorded document");

        Ok(CompletedUpload {
            url: stored.url,
            name: metadata.target_file_name.clone(),
            folder_name: metadata.destination_folder.clone(),
            document_id: document.id,
            size_bytes: size,
        })
    }
}
