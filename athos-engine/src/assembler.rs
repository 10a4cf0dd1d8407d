//! Reassembly of a completed session into one contiguous buffer

use bytes::{Bytes, BytesMut};
use tracing::debug;
use athos_core::*;
use crate::UploadSession;

/// Concatenate slots `0..N` in index order.
///
/// Fails with `IncompleteSession` if any slot is still empty. Slots may have
/// different lengths.
pub fn assemble(session: &UploadSession) -> Result<Bytes> {
    let missing = session.missing();
    if !missing.is_empty() {
        return Err(AthosError::IncompleteSession {
            session_id: session.id().to_string(),
            missing,
        });
    }

    let total: usize = session.slots().iter().flatten().map(Bytes::len).sum();
    let mut buffer = BytesMut::with_capacity(total);

    for chunk in session.slots().iter().flatten() {
        buffer.extend_from_slice(chunk);
    }

    debug!(
        session_id = %session.id(),
        chunks = session.expected_chunk_count(),
        bytes = total,
        "Assembled upload"
    );

    Ok(buffer.freeze())
}

/// Compare the assembled file against a BLAKE3 digest
pub fn verify_checksum(data: &[u8], expected: &ContentHash) -> Result<()> {
    let actual = ContentHash::new(data);
    if &actual != expected {
        return Err(AthosError::ChecksumMismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}
