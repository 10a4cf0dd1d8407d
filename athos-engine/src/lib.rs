//! Chunked upload engine: session store, receiver, reaper, assembler and
//! publisher, with fjall-backed blob and document stores.

use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use std::sync::Arc;
use athos_core::*;

pub mod assembler;
pub mod blob;
pub mod documents;
pub mod publisher;
pub mod reaper;
pub mod receiver;
pub mod session;

pub use assembler::*;
pub use blob::*;
pub use documents::*;
pub use publisher::*;
pub use reaper::*;
pub use receiver::*;
pub use session::*;

/// Storage engine wrapping a fjall keyspace
#[derive(Clone)]
pub struct StorageEngine {
    keyspace: Arc<Keyspace>,
}

impl StorageEngine {
    /// Open or create a storage engine at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::new(path);
        let keyspace = Arc::new(
            config
                .open()
                .map_err(|e| AthosError::Storage(e.to_string()))?
        );

        Ok(StorageEngine { keyspace })
    }

    /// Create temporary storage engine for testing
    #[cfg(any(test, feature = "test-utils"))]
    pub fn temp() -> Result<(Self, tempfile::TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let engine = Self::new(temp_dir.path())?;
        Ok((engine, temp_dir))
    }

    /// Blob bucket serving objects under `public_base_url`
    pub fn blobs(&self, public_base_url: impl Into<String>) -> Result<BlobBucket> {
        BlobBucket::new(self.clone(), public_base_url.into())
    }

    /// Document record table
    pub fn documents(&self) -> Result<DocumentTable> {
        DocumentTable::new(self.clone())
    }

    pub(crate) fn partition(&self, name: &str) -> Result<PartitionHandle> {
        self.keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .map_err(|e| AthosError::Storage(e.to_string()))
    }

    /// Write batch applied atomically on `commit`
    pub(crate) fn batch(&self) -> Batch {
        self.keyspace.batch()
    }

    /// Persist all changes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| AthosError::Storage(e.to_string()))
    }
}

/// Run fjall reads and synced writes on the blocking pool
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AthosError::Storage(format!("spawn_blocking failed: {e}")))?
}
