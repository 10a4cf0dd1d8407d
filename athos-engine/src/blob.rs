//! Public blob bucket over a fjall partition

use async_trait::async_trait;
use bytes::Bytes;
use fjall::PartitionHandle;
use rand::distributions::Alphanumeric;
use rand::Rng;
use athos_core::*;
use crate::{blocking, ObjectStore, PutOptions, StorageEngine};

const PARTITION: &str = "blobs";
const SUFFIX_LEN: usize = 21;

/// Stored objects, addressed by key and served under a public base URL
#[derive(Clone)]
pub struct BlobBucket {
    partition: PartitionHandle,
    engine: StorageEngine,
    public_base_url: String,
}

impl BlobBucket {
    pub(crate) fn new(engine: StorageEngine, public_base_url: String) -> Result<Self> {
        let partition = engine.partition(PARTITION)?;

        Ok(BlobBucket {
            partition,
            engine,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Public URL for a key
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/files/{}", self.public_base_url, key)
    }

    /// Write an object and return its key
    pub fn put_blob(&self, name: &str, data: &[u8], unique_suffix: bool) -> Result<String> {
        let key = blob_key(name, unique_suffix);

        self.partition
            .insert(self.data_key(&key).as_slice(), data)
            .map_err(|e| AthosError::Storage(e.to_string()))?;

        self.engine.persist()?;

        Ok(key)
    }

    pub fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.partition.get(self.data_key(key)) {
            Ok(Some(data)) => Ok(Some(data.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(AthosError::Storage(e.to_string())),
        }
    }

    pub fn delete_blob(&self, key: &str) -> Result<()> {
        self.partition
            .remove(self.data_key(key).as_slice())
            .map_err(|e| AthosError::Storage(e.to_string()))?;
        self.engine.persist()
    }

    fn data_key(&self, key: &str) -> Vec<u8> {
        format!("blob:{}", key).into_bytes()
    }
}

#[async_trait]
impl ObjectStore for BlobBucket {
    async fn put(&self, name: &str, data: Bytes, options: &PutOptions) -> Result<StoredObject> {
        let bucket = self.clone();
        let name = name.to_string();
        let unique_suffix = options.unique_suffix;

        let key = blocking(move || bucket.put_blob(&name, &data, unique_suffix)).await?;
        let url = self.url_for(&key);
        Ok(StoredObject { key, url })
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let bucket = self.clone();
        let key = key.to_string();
        Ok(blocking(move || bucket.get_blob(&key)).await?.map(Bytes::from))
    }
}

/// Derive a URL-safe object key from an untrusted file name.
///
/// Directory components are dropped and anything outside `[A-Za-z0-9._-]`
/// becomes `_`. With `unique_suffix` a random alphanumeric suffix goes
/// between the stem and the extension: `report.pdf` -> `report-Xk3...9.pdf`.
pub fn blob_key(file_name: &str, unique_suffix: bool) -> String {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);

    let mut sanitized: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    if sanitized.trim_matches('.').is_empty() {
        sanitized = "file".to_string();
    }

    if !unique_suffix {
        return sanitized;
    }

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();

    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}-{}.{}", stem, suffix, ext)
        }
        _ => format!("{}-{}", sanitized, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_sanitizes() {
        assert_eq!(blob_key("report.pdf", false), "report.pdf");
        assert_eq!(blob_key("../../etc/passwd", false), "passwd");
        assert_eq!(blob_key("C:\\docs\\Relatório final.pdf", false), "Relat_rio_final.pdf");
        assert_eq!(blob_key("..", false), "file");
    }

    #[test]
    fn test_blob_key_unique_suffix() {
        let a = blob_key("report.pdf", true);
        let b = blob_key("report.pdf", true);
        assert_ne!(a, b);
        assert!(a.starts_with("report-"));
        assert!(a.ends_with(".pdf"));
        assert_eq!(a.len(), "report-".len() + SUFFIX_LEN + ".pdf".len());

        let bare = blob_key("README", true);
        assert!(bare.starts_with("README-"));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (engine, _temp) = StorageEngine::temp().unwrap();
        let bucket = engine.blobs("http://localhost:8080/").unwrap();

        let stored = bucket
            .put("a.txt", Bytes::from_static(b"hello"), &PutOptions::public_unique("text/plain"))
            .await
            .unwrap();

        assert_eq!(stored.url, format!("http://localhost:8080/files/{}", stored.key));
        let data = ObjectStore::get(&bucket, &stored.key).await.unwrap().unwrap();
        assert_eq!(&data[..], b"hello");

        bucket.delete_blob(&stored.key).unwrap();
        assert!(bucket.get_blob(&stored.key).unwrap().is_none());
    }
}
