//! Splitting a file into upload chunks

use bytes::Bytes;
use crate::{ClientError, Result};

/// A file cut into fixed-size pieces under one session id.
///
/// Every chunk but the last is exactly `chunk_size` bytes.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    file_id: String,
    chunk_size: usize,
    data: Bytes,
}

impl ChunkPlan {
    /// Plan with a fresh ULID session id
    pub fn new(data: Bytes, chunk_size: usize) -> Result<Self> {
        Self::with_file_id(ulid::Ulid::new().to_string(), data, chunk_size)
    }

    pub fn with_file_id(file_id: impl Into<String>, data: Bytes, chunk_size: usize) -> Result<Self> {
        if data.is_empty() {
            return Err(ClientError::Policy("cannot split an empty file".to_string()));
        }
        if chunk_size == 0 {
            return Err(ClientError::Policy("chunk size must be positive".to_string()));
        }

        Ok(ChunkPlan {
            file_id: file_id.into(),
            chunk_size,
            data,
        })
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn total_chunks(&self) -> u32 {
        self.data.len().div_ceil(self.chunk_size) as u32
    }

    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    /// Chunk `index`; slices share the file's buffer
    pub fn chunk(&self, index: u32) -> Option<Bytes> {
        let start = (index as usize).checked_mul(self.chunk_size)?;
        if start >= self.data.len() {
            return None;
        }
        let end = (start + self.chunk_size).min(self.data.len());
        Some(self.data.slice(start..end))
    }

    /// `(index, bytes)` in index order
    pub fn chunks(&self) -> impl Iterator<Item = (u32, Bytes)> + '_ {
        (0..self.total_chunks()).filter_map(move |i| self.chunk(i).map(|c| (i, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_uneven() {
        let plan = ChunkPlan::with_file_id("f", Bytes::from_static(b"abcdefghij"), 4).unwrap();
        assert_eq!(plan.total_chunks(), 3);

        let chunks: Vec<(u32, Bytes)> = plan.chunks().collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[0].1[..], b"abcd");
        assert_eq!(&chunks[1].1[..], b"efgh");
        assert_eq!(&chunks[2].1[..], b"ij");
        assert!(plan.chunk(3).is_none());
    }

    #[test]
    fn test_split_exact_multiple() {
        let plan = ChunkPlan::with_file_id("f", Bytes::from(vec![0u8; 8]), 4).unwrap();
        assert_eq!(plan.total_chunks(), 2);
        assert_eq!(plan.chunks().map(|(_, c)| c.len()).sum::<usize>(), 8);
    }

    #[test]
    fn test_fresh_ids_and_rejections() {
        let a = ChunkPlan::new(Bytes::from_static(b"x"), 4).unwrap();
        let b = ChunkPlan::new(Bytes::from_static(b"x"), 4).unwrap();
        assert_ne!(a.file_id(), b.file_id());
        assert_eq!(a.total_chunks(), 1);

        assert!(ChunkPlan::new(Bytes::new(), 4).is_err());
        assert!(ChunkPlan::new(Bytes::from_static(b"x"), 0).is_err());
    }
}
