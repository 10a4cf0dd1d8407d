//! HTTP request handlers for the upload service

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::borrow::Cow;
use tracing::{debug, error, info, warn};
use athos_core::*;
use athos_engine::{
    ChunkPayload, ChunkSubmission, DirectUpload, DocumentRepository, ObjectStore, SessionStore,
    UploadService,
};
use crate::server::{bytes_response, json_response};

type BoxBody = Full<Bytes>;

const OCTET_STREAM: &str = "application/octet-stream";

/// Main request handler. Never fails: errors become JSON error responses.
pub async fn handle_request<B>(req: Request<B>, service: &UploadService) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {}", method, path);

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    let result = match (&method, segments.as_slice()) {
        (&Method::GET, ["health"]) => handle_health(service).await,

        (&Method::POST, ["v1", "chunks"]) => handle_chunk(req, service).await,
        (&Method::POST, ["v1", "documents"]) => handle_direct_upload(req, service).await,

        (&Method::GET, ["v1", "owners", owner, "documents"]) => {
            handle_list_documents(service, owner).await
        }
        (&Method::DELETE, ["v1", "documents", id]) => handle_remove_document(service, id).await,
        (&Method::DELETE, ["v1", "owners", owner, "folders", folder]) => {
            handle_remove_folder(service, owner, folder).await
        }

        (&Method::GET, ["files", key]) if !key.is_empty() => handle_get_file(service, key).await,

        _ => Err(AthosError::NotFound(format!("no route for {} {}", method, path))),
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => error_response(&e),
    };

    info!("{} {} -> {}", method, path, response.status());
    response
}

/// HTTP status for a service error
pub fn status_for(error: &AthosError) -> StatusCode {
    match error.root() {
        AthosError::ChunkTooLarge { .. } | AthosError::FileTooLarge { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        AthosError::InvalidPayloadType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        AthosError::NotFound(_) => StatusCode::NOT_FOUND,
        AthosError::ChecksumMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AthosError::Storage(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &AthosError) -> Response<BoxBody> {
    let status = status_for(error);

    if status.is_server_error() {
        error!(kind = error.kind(), "Request failed: {}", error);
    } else {
        debug!(kind = error.kind(), "Request rejected: {}", error);
    }

    match serde_json::to_vec(&UploadResponse::failed(error)) {
        Ok(body) => json_response(status, body),
        Err(_) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"success": false, "error": "Internal server error"}).to_string(),
        ),
    }
}

fn upload_response(response: &UploadResponse) -> Result<Response<BoxBody>> {
    let body = serde_json::to_vec(response)?;
    Ok(json_response(StatusCode::OK, body))
}

/// Health check handler
async fn handle_health(service: &UploadService) -> Result<Response<BoxBody>> {
    let sessions = service.store().len().await?;

    Ok(json_response(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "service": "athos-uploads",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": sessions,
        })
        .to_string(),
    ))
}

/// POST /v1/chunks
async fn handle_chunk<B>(req: Request<B>, service: &UploadService) -> Result<Response<BoxBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let max = service.config().max_chunk_bytes;

    let data = read_body(body, max).await?.ok_or_else(|| AthosError::ChunkTooLarge {
        size: declared_length(&parts.headers).unwrap_or(max + 1),
        max,
    })?;

    let submission = chunk_submission(&parts.headers, data)?;
    let outcome = service.submit_chunk(submission).await?;

    upload_response(&UploadResponse::from_outcome(&outcome))
}

/// POST /v1/documents
async fn handle_direct_upload<B>(req: Request<B>, service: &UploadService) -> Result<Response<BoxBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let max = service.config().max_chunk_bytes;

    let data = read_body(body, max).await?.ok_or_else(|| AthosError::FileTooLarge {
        size: declared_length(&parts.headers).unwrap_or(max + 1),
        max,
    })?;

    let map = &parts.headers;
    let upload = DirectUpload {
        file: Some(payload(map, data)),
        file_name: encoded_header(map, headers::FILE_NAME, "fileName")?,
        file_type: plain_header(map, headers::FILE_TYPE, "fileType")?,
        owner_record_id: plain_header(map, headers::OWNER_RECORD_ID, "ownerRecordId")?,
        folder_name: encoded_header(map, headers::FOLDER_NAME, "folderName")?,
    };

    let completed = service.upload_whole(upload).await?;
    upload_response(&UploadResponse::completed(&completed))
}

/// GET /v1/owners/{owner}/documents
async fn handle_list_documents(service: &UploadService, owner: &str) -> Result<Response<BoxBody>> {
    let owner = OwnerRecordId::new(&decode_segment(owner, "ownerRecordId")?)?;
    let documents = service.publisher().documents().list_by_owner(&owner).await?;

    debug!(owner = %owner, count = documents.len(), "Listed documents");
    Ok(json_response(StatusCode::OK, serde_json::to_vec(&documents)?))
}

/// DELETE /v1/documents/{id}
async fn handle_remove_document(service: &UploadService, id: &str) -> Result<Response<BoxBody>> {
    let id: DocumentId = id.parse()?;

    if !service.publisher().documents().remove(id).await? {
        return Err(AthosError::NotFound(format!("document {}", id)));
    }

    info!(document_id = %id, "Removed document");
    Ok(json_response(
        StatusCode::OK,
        json!({"success": true, "removed": 1}).to_string(),
    ))
}

/// DELETE /v1/owners/{owner}/folders/{folder}
async fn handle_remove_folder(
    service: &UploadService,
    owner: &str,
    folder: &str,
) -> Result<Response<BoxBody>> {
    let owner = OwnerRecordId::new(&decode_segment(owner, "ownerRecordId")?)?;
    let folder = decode_segment(folder, "folderName")?;

    let removed = service
        .publisher()
        .documents()
        .remove_folder(&owner, &folder)
        .await?;

    info!(owner = %owner, folder = %folder, removed, "Removed folder documents");
    Ok(json_response(
        StatusCode::OK,
        json!({"success": true, "removed": removed}).to_string(),
    ))
}

/// GET /files/{key}
async fn handle_get_file(service: &UploadService, key: &str) -> Result<Response<BoxBody>> {
    match service.publisher().objects().get(key).await? {
        Some(data) => Ok(bytes_response(data)),
        None => Err(AthosError::NotFound(format!("file {}", key))),
    }
}

/// Collect a body of at most `limit` bytes; `None` when it is longer.
async fn read_body<B>(body: B, limit: u64) -> Result<Option<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(Some(collected.to_bytes())),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Ok(None),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            Err(AthosError::Unknown(format!("failed to read request body: {}", e)))
        }
    }
}

fn declared_length(map: &HeaderMap) -> Option<u64> {
    map.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

/// Build a chunk submission from the request headers and raw body
fn chunk_submission(map: &HeaderMap, data: Bytes) -> Result<ChunkSubmission> {
    Ok(ChunkSubmission {
        chunk: Some(payload(map, data)),
        chunk_index: plain_header(map, headers::CHUNK_INDEX, "chunkIndex")?,
        total_chunks: plain_header(map, headers::TOTAL_CHUNKS, "totalChunks")?,
        file_id: plain_header(map, headers::FILE_ID, "fileId")?,
        file_name: encoded_header(map, headers::FILE_NAME, "fileName")?,
        file_type: plain_header(map, headers::FILE_TYPE, "fileType")?,
        owner_record_id: plain_header(map, headers::OWNER_RECORD_ID, "ownerRecordId")?,
        folder_name: encoded_header(map, headers::FOLDER_NAME, "folderName")?,
        checksum: plain_header(map, headers::CHECKSUM, "checksum")?,
    })
}

/// The body counts as binary when it is untyped or `application/octet-stream`
fn payload(map: &HeaderMap, data: Bytes) -> ChunkPayload {
    let Some(value) = map.get(CONTENT_TYPE) else {
        return ChunkPayload::Binary(data);
    };

    let content_type = String::from_utf8_lossy(value.as_bytes()).into_owned();
    let essence = content_type.split(';').next().unwrap_or("").trim();

    if essence.eq_ignore_ascii_case(OCTET_STREAM) {
        ChunkPayload::Binary(data)
    } else {
        ChunkPayload::Other(content_type)
    }
}

fn plain_header(map: &HeaderMap, name: &str, field: &'static str) -> Result<Option<String>> {
    match map.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim().to_string()))
            .map_err(|_| AthosError::InvalidField {
                field,
                reason: "header is not visible ASCII".to_string(),
            }),
    }
}

/// Header carrying percent-encoded UTF-8
fn encoded_header(map: &HeaderMap, name: &str, field: &'static str) -> Result<Option<String>> {
    match plain_header(map, name, field)? {
        None => Ok(None),
        Some(raw) => decode_segment(&raw, field).map(Some),
    }
}

fn decode_segment(raw: &str, field: &'static str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| AthosError::InvalidField {
            field,
            reason: "not valid percent-encoded UTF-8".to_string(),
        })
}
