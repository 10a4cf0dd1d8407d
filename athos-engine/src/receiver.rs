//! Chunk receiver: validation, slot writes and the completion hand-off

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use athos_core::*;
use crate::{assemble, verify_checksum, Publisher, Reaper, SessionStore, SlotWrite};

/// Upper bound on `totalChunks`, which sizes the slot table up front.
pub const MAX_TOTAL_CHUNKS: u32 = 10_000;

/// A chunk or file body as it arrived on the wire
#[derive(Debug, Clone)]
pub enum ChunkPayload {
    Binary(Bytes),
    /// Anything that is not raw bytes, labelled with what it was
    Other(String),
}

impl ChunkPayload {
    fn into_binary(self) -> Result<Bytes> {
        match self {
            ChunkPayload::Binary(data) => Ok(data),
            ChunkPayload::Other(kind) => Err(AthosError::InvalidPayloadType(kind)),
        }
    }
}

/// One chunk submission, fields as untrusted strings
#[derive(Debug, Clone, Default)]
pub struct ChunkSubmission {
    pub chunk: Option<ChunkPayload>,
    pub chunk_index: Option<String>,
    pub total_chunks: Option<String>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub owner_record_id: Option<String>,
    pub folder_name: Option<String>,
    /// BLAKE3 hex digest of the whole file
    pub checksum: Option<String>,
}

/// A submission that passed validation
#[derive(Debug, Clone)]
pub struct ValidChunk {
    pub session_id: SessionId,
    pub index: u32,
    pub total_chunks: u32,
    pub data: Bytes,
    pub metadata: UploadMetadata,
}

impl ChunkSubmission {
    pub fn validate(self, config: &UploadConfig) -> Result<ValidChunk> {
        let chunk = self.chunk.ok_or(AthosError::MissingField("chunk"))?;
        let chunk_index = required(self.chunk_index, "chunkIndex")?;
        let total_chunks = required(self.total_chunks, "totalChunks")?;
        let file_id = required(self.file_id, "fileId")?;
        let file_name = required(self.file_name, "fileName")?;
        let owner_record_id = required(self.owner_record_id, "ownerRecordId")?;

        let data = chunk.into_binary()?;
        if data.len() as u64 > config.max_chunk_bytes {
            return Err(AthosError::ChunkTooLarge {
                size: data.len() as u64,
                max: config.max_chunk_bytes,
            });
        }
        // A fresh session holds nothing, so this is the store's bound for a first write.
        if data.len() as u64 > config.max_file_bytes {
            return Err(AthosError::FileTooLarge {
                size: data.len() as u64,
                max: config.max_file_bytes,
            });
        }

        let total = parse_total_chunks(&total_chunks)?;
        let index = chunk_index
            .trim()
            .parse::<u32>()
            .map_err(|_| AthosError::InvalidChunkIndex {
                index: chunk_index.clone(),
                total,
            })?;

        let metadata = build_metadata(
            file_name,
            self.file_type,
            &owner_record_id,
            self.folder_name,
            self.checksum,
        )?;

        Ok(ValidChunk {
            session_id: SessionId::new(&file_id)?,
            index,
            total_chunks: total,
            data,
            metadata,
        })
    }
}

/// A whole file sent in one request
#[derive(Debug, Clone, Default)]
pub struct DirectUpload {
    pub file: Option<ChunkPayload>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub owner_record_id: Option<String>,
    pub folder_name: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AthosError::MissingField(field)),
    }
}

fn parse_total_chunks(raw: &str) -> Result<u32> {
    match raw.trim().parse::<u32>() {
        Ok(total) if total > 0 && total <= MAX_TOTAL_CHUNKS => Ok(total),
        _ => Err(AthosError::InvalidField {
            field: "totalChunks",
            reason: format!("'{}' is not an integer in 1..={}", raw, MAX_TOTAL_CHUNKS),
        }),
    }
}

fn build_metadata(
    file_name: String,
    file_type: Option<String>,
    owner_record_id: &str,
    folder_name: Option<String>,
    checksum: Option<String>,
) -> Result<UploadMetadata> {
    let mut metadata = UploadMetadata::new(file_name, OwnerRecordId::new(owner_record_id)?);

    if let Some(file_type) = file_type.filter(|t| !t.is_empty()) {
        metadata = metadata.with_content_type(file_type);
    }
    if let Some(folder) = folder_name.filter(|f| !f.is_empty()) {
        metadata = metadata.with_folder(folder);
    }
    if let Some(checksum) = checksum.filter(|c| !c.is_empty()) {
        metadata = metadata.with_checksum(ContentHash::from_hex(&checksum)?);
    }

    Ok(metadata)
}

fn check_index(index: u32, expected: u32) -> Result<()> {
    if index >= expected {
        return Err(AthosError::InvalidChunkIndex {
            index: index.to_string(),
            total: expected,
        });
    }
    Ok(())
}

/// Front door of the service: receives chunks and publishes completed files
pub struct UploadService {
    store: Arc<dyn SessionStore>,
    publisher: Publisher,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(store: Arc<dyn SessionStore>, publisher: Publisher, config: UploadConfig) -> Self {
        UploadService {
            store,
            publisher,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Reaper for this service's session store, using the configured timers
    pub fn reaper(&self) -> Reaper {
        Reaper::new(
            self.store.clone(),
            self.config.reap_interval(),
            self.config.session_timeout(),
        )
    }

    /// Accept one chunk.
    ///
    /// Validation failures leave the store untouched. The call that fills the
    /// last slot assembles and publishes the file and returns the terminal
    /// result; the session is gone afterwards whatever that result is.
    pub async fn submit_chunk(&self, submission: ChunkSubmission) -> Result<ChunkOutcome> {
        let chunk = submission.validate(&self.config)?;

        debug!(
            session_id = %chunk.session_id,
            index = chunk.index,
            total = chunk.total_chunks,
            size = chunk.data.len(),
            "Received chunk"
        );

        let write = self.write_chunk(&chunk).await?;

        match write {
            SlotWrite::Pending { filled, expected, replaced } => {
                if replaced {
                    warn!(
                        session_id = %chunk.session_id,
                        index = chunk.index,
                        "Chunk was already received, replacing"
                    );
                }

                let progress = f64::from(filled) / f64::from(expected) * 100.0;
                debug!(session_id = %chunk.session_id, filled, expected, "Upload progress");

                Ok(ChunkOutcome::Progress {
                    progress,
                    filled,
                    expected,
                })
            }
            SlotWrite::Complete(session) => {
                info!(
                    session_id = %session.id(),
                    chunks = session.expected_chunk_count(),
                    bytes = session.received_bytes(),
                    "All chunks received, assembling"
                );

                let data = assemble(&session).map_err(AthosError::assembly)?;

                if self.config.verify_checksums {
                    if let Some(expected) = &session.metadata().expected_checksum {
                        verify_checksum(&data, expected).map_err(AthosError::assembly)?;
                    }
                }

                let upload = self
                    .publisher
                    .publish(data, session.metadata())
                    .await
                    .map_err(AthosError::assembly)?;

                Ok(ChunkOutcome::Complete(upload))
            }
        }
    }

    async fn write_chunk(&self, chunk: &ValidChunk) -> Result<SlotWrite> {
        let expected = match self.store.get(&chunk.session_id).await? {
            Some(existing) => existing.expected_chunk_count,
            None => chunk.total_chunks,
        };
        check_index(chunk.index, expected)?;

        // One retry covers a session reaped between creation and the write.
        let mut attempts = 0;
        loop {
            attempts += 1;

            let (summary, created) = self
                .store
                .create_if_absent(&chunk.session_id, chunk.total_chunks, chunk.metadata.clone())
                .await?;

            if created {
                info!(
                    session_id = %chunk.session_id,
                    file = %chunk.metadata.target_file_name,
                    chunks = chunk.total_chunks,
                    "Created upload session"
                );
            } else if summary.expected_chunk_count != chunk.total_chunks {
                warn!(
                    session_id = %chunk.session_id,
                    expected = summary.expected_chunk_count,
                    submitted = chunk.total_chunks,
                    "Total chunk count differs from session, keeping session value"
                );
            }

            check_index(chunk.index, summary.expected_chunk_count)?;

            match self.store.set_slot(&chunk.session_id, chunk.index, chunk.data.clone()).await {
                Err(AthosError::NotFound(_)) if attempts < 2 => continue,
                other => return other,
            }
        }
    }

    /// Publish a file received in a single request
    pub async fn upload_whole(&self, upload: DirectUpload) -> Result<CompletedUpload> {
        let file = upload.file.ok_or(AthosError::MissingField("file"))?;
        let file_name = required(upload.file_name, "fileName")?;
        let owner_record_id = required(upload.owner_record_id, "ownerRecordId")?;

        let data = file.into_binary()?;
        if data.is_empty() {
            return Err(AthosError::EmptyFile);
        }
        if data.len() as u64 > self.config.max_chunk_bytes {
            return Err(AthosError::FileTooLarge {
                size: data.len() as u64,
                max: self.config.max_chunk_bytes,
            });
        }

        let metadata = build_metadata(
            file_name,
            upload.file_type,
            &owner_record_id,
            upload.folder_name,
            None,
        )?;

        info!(file = %metadata.target_file_name, size = data.len(), "Direct upload");
        self.publisher.publish(data, &metadata).await
    }
}
