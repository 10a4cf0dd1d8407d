//! HTTP/2 front end for the SysAthos upload service

use std::sync::Arc;
use athos_core::*;
use athos_engine::{MemorySessionStore, Publisher, StorageEngine, UploadService};

pub mod handlers;
pub mod server;

pub use handlers::{handle_request, status_for};
pub use server::AthosServer;

/// Wire an upload service over a fjall storage engine: in-memory sessions,
/// blobs served under `public_base_url`, and the document table.
pub fn build_service(
    engine: &StorageEngine,
    public_base_url: &str,
    config: UploadConfig,
) -> Result<UploadService> {
    let store = Arc::new(MemorySessionStore::new(&config));
    let objects = Arc::new(engine.blobs(public_base_url)?);
    let documents = Arc::new(engine.documents()?);

    Ok(UploadService::new(store, Publisher::new(objects, documents), config))
}
