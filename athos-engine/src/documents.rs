//! Document records over a fjall partition

use async_trait::async_trait;
use fjall::PartitionHandle;
use athos_core::*;
use crate::{blocking, DocumentRepository, StorageEngine};

const PARTITION: &str = "documents";

/// Document records keyed by id, with a per-owner index.
///
/// Layout: `doc:{id}` holds the JSON record, `owner:{owner}\0{id}` is an
/// empty index entry. Both are written in one batch. Ids are monotonic
/// ULIDs, so index order is creation order.
#[derive(Clone)]
pub struct DocumentTable {
    partition: PartitionHandle,
    engine: StorageEngine,
}

impl DocumentTable {
    pub(crate) fn new(engine: StorageEngine) -> Result<Self> {
        let partition = engine.partition(PARTITION)?;
        Ok(DocumentTable { partition, engine })
    }

    pub fn insert(&self, document: &PublishedDocument) -> Result<()> {
        let json = serde_json::to_vec(document).map_err(AthosError::Serialization)?;

        let mut batch = self.engine.batch();
        batch.insert(&self.partition, self.doc_key(document.id), json);
        batch.insert(
            &self.partition,
            self.owner_key(&document.owner_record_id, document.id),
            b"".as_slice(),
        );
        batch.commit().map_err(|e| AthosError::Storage(e.to_string()))?;

        self.engine.persist()
    }

    pub fn get(&self, id: DocumentId) -> Result<Option<PublishedDocument>> {
        match self.partition.get(self.doc_key(id)) {
            Ok(Some(data)) => {
                let document: PublishedDocument = serde_json::from_slice(&data)
                    .map_err(AthosError::Serialization)?;
                Ok(Some(document))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(AthosError::Storage(e.to_string())),
        }
    }

    /// Documents of one owner, newest first
    pub fn list_owner(&self, owner: &OwnerRecordId) -> Result<Vec<PublishedDocument>> {
        let prefix = self.owner_prefix(owner);
        let mut documents = Vec::new();

        for item in self.partition.prefix(prefix.as_slice()).rev() {
            let (key, _) = item.map_err(|e| AthosError::Storage(format!("Scan error: {}", e)))?;

            let id_part = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| AthosError::Storage(format!("Corrupt index key: {}", e)))?;
            let id: DocumentId = id_part.parse()?;

            if let Some(document) = self.get(id)? {
                documents.push(document);
            }
        }

        Ok(documents)
    }

    pub fn delete(&self, id: DocumentId) -> Result<bool> {
        let Some(document) = self.get(id)? else {
            return Ok(false);
        };

        let mut batch = self.engine.batch();
        batch.remove(&self.partition, self.doc_key(id));
        batch.remove(&self.partition, self.owner_key(&document.owner_record_id, id));
        batch.commit().map_err(|e| AthosError::Storage(e.to_string()))?;

        self.engine.persist()?;
        Ok(true)
    }

    fn doc_key(&self, id: DocumentId) -> Vec<u8> {
        format!("doc:{}", id).into_bytes()
    }

    fn owner_prefix(&self, owner: &OwnerRecordId) -> Vec<u8> {
        format!("owner:{}\0", owner.as_str()).into_bytes()
    }

    fn owner_key(&self, owner: &OwnerRecordId, id: DocumentId) -> Vec<u8> {
        let mut key = self.owner_prefix(owner);
        key.extend_from_slice(id.to_string().as_bytes());
        key
    }
}

#[async_trait]
impl DocumentRepository for DocumentTable {
    async fn insert_document(&self, document: NewDocument) -> Result<PublishedDocument> {
        let table = self.clone();
        let document = document.into_document();

        blocking(move || {
            table.insert(&document)?;
            Ok(document)
        })
        .await
    }

    async fn list_by_owner(&self, owner: &OwnerRecordId) -> Result<Vec<PublishedDocument>> {
        let table = self.clone();
        let owner = owner.clone();
        blocking(move || table.list_owner(&owner)).await
    }

    async fn remove(&self, id: DocumentId) -> Result<bool> {
        let table = self.clone();
        blocking(move || table.delete(id)).await
    }

    async fn remove_folder(&self, owner: &OwnerRecordId, folder: &str) -> Result<usize> {
        let table = self.clone();
        let owner = owner.clone();
        let folder = folder.to_string();

        blocking(move || {
            let mut removed = 0;
            for document in table.list_owner(&owner)? {
                if document.folder.as_deref() == Some(folder.as_str()) && table.delete(document.id)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_document(owner: &str, name: &str, folder: Option<&str>) -> NewDocument {
        NewDocument {
            owner_record_id: OwnerRecordId::new(owner).unwrap(),
            name: name.to_string(),
            url: format!("http://localhost/files/{}", name),
            folder: folder.map(str::to_string),
            size: 42,
            content_type: "application/pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_list_newest_first() {
        let (engine, _temp) = StorageEngine::temp().unwrap();
        let table = engine.documents().unwrap();

        let first = table.insert_document(new_document("p1", "a.pdf", None)).await.unwrap();
        let second = table.insert_document(new_document("p1", "b.pdf", None)).await.unwrap();
        table.insert_document(new_document("p2", "c.pdf", None)).await.unwrap();

        let listed = table.list_by_owner(&OwnerRecordId::new("p1").unwrap()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(listed[1].size_bytes, 42);
    }

    #[tokio::test]
    async fn test_burst_inserts_list_in_reverse_order() {
        let (engine, _temp) = StorageEngine::temp().unwrap();
        let table = engine.documents().unwrap();

        let mut inserted = Vec::new();
        for i in 0..20 {
            let name = format!("{}.pdf", i);
            inserted.push(table.insert_document(new_document("p1", &name, None)).await.unwrap().id);
        }
        inserted.reverse();

        let listed: Vec<DocumentId> = table
            .list_by_owner(&OwnerRecordId::new("p1").unwrap())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(listed, inserted);
    }

    #[tokio::test]
    async fn test_record_and_index_entry_written_together() {
        let (engine, _temp) = StorageEngine::temp().unwrap();
        let table = engine.documents().unwrap();
        let owner = OwnerRecordId::new("p1").unwrap();

        let document = table.insert_document(new_document("p1", "a.pdf", None)).await.unwrap();
        assert!(table.partition.get(table.doc_key(document.id)).unwrap().is_some());
        assert!(table.partition.get(table.owner_key(&owner, document.id)).unwrap().is_some());

        assert!(table.delete(document.id).unwrap());
        assert!(table.partition.get(table.doc_key(document.id)).unwrap().is_none());
        assert!(table.partition.get(table.owner_key(&owner, document.id)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owner_prefix_does_not_leak() {
        let (engine, _temp) = StorageEngine::temp().unwrap();
        let table = engine.documents().unwrap();

        table.insert_document(new_document("p1", "a.pdf", None)).await.unwrap();
        table.insert_document(new_document("p10", "b.pdf", None)).await.unwrap();

        let listed = table.list_by_owner(&OwnerRecordId::new("p1").unwrap()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_name, "a.pdf");
    }

    #[tokio::test]
    async fn test_remove_and_remove_folder() {
        let (engine, _temp) = StorageEngine::temp().unwrap();
        let table = engine.documents().unwrap();
        let owner = OwnerRecordId::new("p1").unwrap();

        let loose = table.insert_document(new_document("p1", "a.pdf", None)).await.unwrap();
        table.insert_document(new_document("p1", "b.pdf", Some("rg"))).await.unwrap();
        table.insert_document(new_document("p1", "c.pdf", Some("rg"))).await.unwrap();
        table.insert_document(new_document("p1", "d.pdf", Some("cpf"))).await.unwrap();

        assert_eq!(table.remove_folder(&owner, "rg").await.unwrap(), 2);
        assert_eq!(table.list_by_owner(&owner).await.unwrap().len(), 2);

        assert!(table.remove(loose.id).await.unwrap());
        assert!(!table.remove(loose.id).await.unwrap());
        assert!(table.get(loose.id).unwrap().is_none());

        let remaining = table.list_by_owner(&owner).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].folder.as_deref(), Some("cpf"));
    }
}
