//! Upload sessions and the store that holds them between chunk submissions

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use athos_core::*;

/// A file transfer in progress: one slot per expected chunk.
#[derive(Debug)]
pub struct UploadSession {
    id: SessionId,
    expected_chunk_count: u32,
    slots: Vec<Option<Bytes>>,
    metadata: UploadMetadata,
    received_bytes: u64,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(id: SessionId, expected_chunk_count: u32, metadata: UploadMetadata) -> Self {
        let now = Utc::now();
        UploadSession {
            id,
            expected_chunk_count,
            slots: vec![None; expected_chunk_count as usize],
            metadata,
            received_bytes: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn expected_chunk_count(&self) -> u32 {
        self.expected_chunk_count
    }

    pub fn metadata(&self) -> &UploadMetadata {
        &self.metadata
    }

    pub fn slots(&self) -> &[Option<Bytes>] {
        &self.slots
    }

    pub fn slot(&self, index: u32) -> Option<&Bytes> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn filled_count(&self) -> u32 {
        self.slots.iter().filter(|s| s.is_some()).count() as u32
    }

    /// Indices of slots not yet received
    pub fn missing(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Fill (or overwrite) a slot. Returns true when a previous payload was replaced.
    ///
    /// `max_bytes` bounds the sum of all slot lengths; nothing is written when
    /// the write would exceed it.
    pub fn write_slot(&mut self, index: u32, data: Bytes, max_bytes: u64) -> Result<bool> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or_else(|| AthosError::InvalidChunkIndex {
                index: index.to_string(),
                total: self.expected_chunk_count,
            })?;

        let previous = slot.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        let received = self.received_bytes - previous + data.len() as u64;
        if received > max_bytes {
            return Err(AthosError::FileTooLarge {
                size: received,
                max: max_bytes,
            });
        }

        let replaced = slot.replace(data).is_some();
        self.received_bytes = received;
        self.last_activity_at = Utc::now();
        Ok(replaced)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            expected_chunk_count: self.expected_chunk_count,
            filled: self.filled_count(),
            received_bytes: self.received_bytes,
            metadata: self.metadata.clone(),
            last_activity_at: self.last_activity_at,
        }
    }
}

/// Byte-free view of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub expected_chunk_count: u32,
    pub filled: u32,
    pub received_bytes: u64,
    pub metadata: UploadMetadata,
    pub last_activity_at: DateTime<Utc>,
}

/// Outcome of writing one slot
#[derive(Debug)]
pub enum SlotWrite {
    Pending {
        filled: u32,
        expected: u32,
        replaced: bool,
    },
    /// The write filled the last slot. The session has already been removed
    /// from the store, so only this caller holds it.
    Complete(UploadSession),
}

/// Holding area for sessions between chunk submissions.
///
/// Implementations must make the completeness check and the removal of a
/// completed session a single atomic step, so that of several racing writers
/// exactly one receives [`SlotWrite::Complete`].
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionSummary>>;

    /// Returns the live session summary and whether this call created it.
    async fn create_if_absent(
        &self,
        id: &SessionId,
        expected_chunk_count: u32,
        metadata: UploadMetadata,
    ) -> Result<(SessionSummary, bool)>;

    /// Fails with `NotFound` when the session does not exist.
    async fn set_slot(&self, id: &SessionId, index: u32, data: Bytes) -> Result<SlotWrite>;

    async fn remove(&self, id: &SessionId) -> Result<Option<UploadSession>>;

    /// Sessions whose last activity is before `older_than`
    async fn list_stale(&self, older_than: DateTime<Utc>) -> Result<Vec<SessionId>>;

    /// Atomically remove every session idle since before `older_than`
    async fn remove_stale(&self, older_than: DateTime<Utc>) -> Result<Vec<SessionId>>;

    async fn len(&self) -> Result<usize>;
}

/// Single-process, in-memory session store. Sessions do not survive a restart.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, UploadSession>>,
    max_file_bytes: u64,
}

impl MemorySessionStore {
    pub fn new(config: &UploadConfig) -> Self {
        MemorySessionStore {
            sessions: Mutex::new(HashMap::new()),
            max_file_bytes: config.max_file_bytes,
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(&UploadConfig::default())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionSummary>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(id).map(UploadSession::summary))
    }

    async fn create_if_absent(
        &self,
        id: &SessionId,
        expected_chunk_count: u32,
        metadata: UploadMetadata,
    ) -> Result<(SessionSummary, bool)> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(id) {
            return Ok((existing.summary(), false));
        }

        let session = UploadSession::new(id.clone(), expected_chunk_count, metadata);
        let summary = session.summary();
        sessions.insert(id.clone(), session);
        Ok((summary, true))
    }

    async fn set_slot(&self, id: &SessionId, index: u32, data: Bytes) -> Result<SlotWrite> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| AthosError::NotFound(format!("upload session {}", id)))?;

        let replaced = session.write_slot(index, data, self.max_file_bytes)?;

        if session.is_complete() {
            // Removed under the same lock as the check: exactly one winner.
            let session = sessions
                .remove(id)
                .ok_or_else(|| AthosError::Unknown(format!("session {} vanished under lock", id)))?;
            return Ok(SlotWrite::Complete(session));
        }

        Ok(SlotWrite::Pending {
            filled: session.filled_count(),
            expected: session.expected_chunk_count(),
            replaced,
        })
    }

    async fn remove(&self, id: &SessionId) -> Result<Option<UploadSession>> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.remove(id))
    }

    async fn list_stale(&self, older_than: DateTime<Utc>) -> Result<Vec<SessionId>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .filter(|s| s.last_activity_at() < older_than)
            .map(|s| s.id().clone())
            .collect())
    }

    async fn remove_stale(&self, older_than: DateTime<Utc>) -> Result<Vec<SessionId>> {
        let mut sessions = self.sessions.lock().await;
        let stale: Vec<SessionId> = sessions
            .values()
            .filter(|s| s.last_activity_at() < older_than)
            .map(|s| s.id().clone())
            .collect();

        for id in &stale {
            sessions.remove(id);
        }

        Ok(stale)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.sessions.lock().await.len())
    }
}
