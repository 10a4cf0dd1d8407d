//! Shared fixtures and in-memory collaborators for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use athos_core::*;
use athos_engine::*;

/// Object store keeping every put in memory
#[derive(Default)]
pub struct MemoryObjects {
    pub objects: Mutex<Vec<(String, Bytes)>>,
    pub puts: AtomicUsize,
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn put(&self, name: &str, data: Bytes, options: &PutOptions) -> Result<StoredObject> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let key = blob_key(name, options.unique_suffix);
        self.objects.lock().unwrap().push((key.clone(), data));
        Ok(StoredObject {
            url: format!("http://files.test/files/{}", key),
            key,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
    }
}

impl MemoryObjects {
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn only_object(&self) -> Bytes {
        let objects = self.objects.lock().unwrap();
        assert_eq!(objects.len(), 1, "expected exactly one stored object");
        objects[0].1.clone()
    }
}

/// Object store that always fails
pub struct FailingObjects;

#[async_trait]
impl ObjectStore for FailingObjects {
    async fn put(&self, _name: &str, _data: Bytes, _options: &PutOptions) -> Result<StoredObject> {
        Err(AthosError::Storage("bucket unavailable".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
        Ok(None)
    }
}

/// Document repository over a vector, with an optional forced insert failure
#[derive(Default)]
pub struct MemoryDocuments {
    pub documents: Mutex<Vec<PublishedDocument>>,
    pub fail_inserts: bool,
}

impl MemoryDocuments {
    pub fn failing() -> Self {
        MemoryDocuments {
            fail_inserts: true,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocuments {
    async fn insert_document(&self, document: NewDocument) -> Result<PublishedDocument> {
        if self.fail_inserts {
            return Err(AthosError::Storage("foreign key violation on owner".to_string()));
        }
        let document = document.into_document();
        self.documents.lock().unwrap().push(document.clone());
        Ok(document)
    }

    async fn list_by_owner(&self, owner: &OwnerRecordId) -> Result<Vec<PublishedDocument>> {
        let documents = self.documents.lock().unwrap();
        Ok(documents
            .iter()
            .rev()
            .filter(|d| &d.owner_record_id == owner)
            .cloned()
            .collect())
    }

    async fn remove(&self, id: DocumentId) -> Result<bool> {
        let mut documents = self.documents.lock().unwrap();
        let before = documents.len();
        documents.retain(|d| d.id != id);
        Ok(documents.len() != before)
    }

    async fn remove_folder(&self, owner: &OwnerRecordId, folder: &str) -> Result<usize> {
        let mut documents = self.documents.lock().unwrap();
        let before = documents.len();
        documents.retain(|d| !(&d.owner_record_id == owner && d.folder.as_deref() == Some(folder)));
        Ok(before - documents.len())
    }
}

/// A service wired to in-memory collaborators
pub struct Harness {
    pub service: UploadService,
    pub objects: Arc<MemoryObjects>,
    pub documents: Arc<MemoryDocuments>,
    pub store: Arc<MemorySessionStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(UploadConfig::default(), MemoryDocuments::default())
    }

    pub fn with(config: UploadConfig, documents: MemoryDocuments) -> Self {
        let objects = Arc::new(MemoryObjects::default());
        let documents = Arc::new(documents);
        let store = Arc::new(MemorySessionStore::new(&config));
        let publisher = Publisher::new(objects.clone(), documents.clone());
        let service = UploadService::new(store.clone(), publisher, config);

        Harness {
            service,
            objects,
            documents,
            store,
        }
    }

    pub async fn sessions(&self) -> usize {
        self.store.len().await.unwrap()
    }
}

/// A well-formed submission for chunk `index` of `total`
pub fn chunk(file_id: &str, index: u32, total: u32, data: impl Into<Bytes>) -> ChunkSubmission {
    ChunkSubmission {
        chunk: Some(ChunkPayload::Binary(data.into())),
        chunk_index: Some(index.to_string()),
        total_chunks: Some(total.to_string()),
        file_id: Some(file_id.to_string()),
        file_name: Some("report.pdf".to_string()),
        file_type: Some("application/pdf".to_string()),
        owner_record_id: Some("processo-1".to_string()),
        folder_name: None,
        checksum: None,
    }
}

/// Deterministic pseudo-random bytes; equal seeds give equal output
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    Bytes::from(data)
}

pub fn progress_of(outcome: &ChunkOutcome) -> f64 {
    match outcome {
        ChunkOutcome::Progress { progress, .. } => *progress,
        ChunkOutcome::Complete(_) => panic!("upload completed unexpectedly"),
    }
}

pub fn completed(outcome: ChunkOutcome) -> CompletedUpload {
    match outcome {
        ChunkOutcome::Complete(upload) => upload,
        ChunkOutcome::Progress { progress, .. } => panic!("upload still in progress at {progress}%"),
    }
}
