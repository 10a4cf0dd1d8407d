//! Core data models and types for the SysAthos upload service

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;

/// Result type alias for upload service operations
pub type Result<T> = std::result::Result<T, AthosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_validation() {
        assert_eq!(SessionId::new("abc").unwrap().as_str(), "abc");
        assert!(SessionId::new("6f1c2d9e-0b4a-4e51-9a57-2f7d3c1b8e44").is_ok());

        assert!(matches!(
            SessionId::new(""),
            Err(AthosError::MissingField("fileId"))
        ));
        assert!(matches!(
            SessionId::new("bad\nid"),
            Err(AthosError::InvalidField { field: "fileId", .. })
        ));
        assert!(SessionId::new(&"x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_owner_record_id_validation() {
        assert!(OwnerRecordId::new("processo-42").is_ok());
        assert!(matches!(
            OwnerRecordId::new(""),
            Err(AthosError::MissingField("ownerRecordId"))
        ));
    }

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::new(b"test data");
        let parsed = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(parsed, hash);

        assert!(ContentHash::from_hex("not-hex").is_err());
        assert!(ContentHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_content_hash_matches_blake3_digest() {
        let hash = ContentHash::new(b"abc");
        assert_eq!(hash.to_hex(), blake3::hash(b"abc").to_hex().as_str());
        assert_eq!(hash.to_hex().len(), 64);

        let padded = format!("  {}\n", hash.to_hex().to_uppercase());
        assert_eq!(ContentHash::from_hex(&padded).unwrap(), hash);

        let mut bad = hash.to_hex();
        bad.replace_range(0..1, "g");
        assert!(matches!(
            ContentHash::from_hex(&bad),
            Err(AthosError::InvalidField { field: "checksum", .. })
        ));
    }

    #[test]
    fn test_document_id_parse() {
        let id = DocumentId::new();
        let parsed: DocumentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("nope".parse::<DocumentId>().is_err());
    }

    #[test]
    fn test_document_ids_strictly_increase() {
        let ids: Vec<DocumentId> = (0..1000).map(|_| DocumentId::new()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(ids.windows(2).all(|w| w[0].to_string() < w[1].to_string()));
    }

    #[test]
    fn test_record_error_kind_survives_wrapping() {
        let err = AthosError::assembly(AthosError::Record {
            url: "http://files/a.pdf".to_string(),
            reason: "insert failed".to_string(),
        });
        assert_eq!(err.kind(), "record_error");
        assert!(matches!(err.root(), AthosError::Record { .. }));
        assert!(err.to_string().contains("was uploaded"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_progress_response_shape() {
        let response = UploadResponse::from_outcome(&ChunkOutcome::Progress {
            progress: 50.0,
            filled: 1,
            expected: 2,
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["complete"], false);
        assert_eq!(json["progress"], 50.0);
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_completed_response_shape() {
        let upload = CompletedUpload {
            url: "http://localhost/files/a-x.pdf".to_string(),
            name: "a.pdf".to_string(),
            folder_name: Some("docs".to_string()),
            document_id: DocumentId::new(),
            size_bytes: 10,
        };
        let json = serde_json::to_value(UploadResponse::completed(&upload)).unwrap();
        assert_eq!(json["complete"], true);
        assert_eq!(json["folderName"], "docs");
        assert_eq!(json["documentId"], upload.document_id.to_string());
    }

    #[test]
    fn test_default_config() {
        let config = UploadConfig::default();
        assert_eq!(config.max_chunk_bytes, 4_718_592);
        assert_eq!(config.reap_interval().as_secs(), 60);
        assert_eq!(config.session_timeout().as_secs(), 600);
        assert!(!config.verify_checksums);

        let parsed: UploadConfig = serde_json::from_str(r#"{"verify_checksums": true}"#).unwrap();
        assert!(parsed.verify_checksums);
        assert_eq!(parsed.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
    }
}
