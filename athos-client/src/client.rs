//! HTTP/2 client for the upload service

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http2;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use athos_core::*;
use crate::{ChunkPlan, ClientError, Result, UploadPolicy};

/// A file to upload and where it belongs
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub owner_record_id: String,
    pub folder_name: Option<String>,
    pub data: Bytes,
    /// Send a BLAKE3 digest so the server can verify the assembled file
    pub send_checksum: bool,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, owner_record_id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        FileUpload {
            file_name: file_name.into(),
            content_type: None,
            owner_record_id: owner_record_id.into(),
            folder_name: None,
            data: data.into(),
            send_checksum: false,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder_name = Some(folder.into());
        self
    }

    pub fn with_checksum(mut self) -> Self {
        self.send_checksum = true;
        self
    }
}

/// Upload service client over one HTTP/2 connection
#[derive(Clone)]
pub struct Client {
    base_url: String,
    sender: http2::SendRequest<Full<Bytes>>,
    policy: UploadPolicy,
}

impl Client {
    /// Connect to a server at `base_url` (e.g. `http://127.0.0.1:8080`)
    pub async fn connect(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let uri: Uri = base_url
            .parse()
            .map_err(|e| ClientError::Connection(format!("Invalid URL: {}", e)))?;

        let host = uri
            .host()
            .ok_or_else(|| ClientError::Connection(format!("No host in {}", base_url)))?;
        let port = uri.port_u16().unwrap_or(80);

        let stream = TcpStream::connect((host, port)).await?;
        let (sender, connection) = http2::handshake(TokioExecutor::new(), TokioIo::new(stream))
            .await
            .map_err(|e| ClientError::Connection(format!("HTTP/2 handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Upload client connection closed: {}", e);
            }
        });

        debug!("Connected to {}", base_url);

        Ok(Client {
            base_url,
            sender,
            policy: UploadPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Check `file` against the policy, then send it directly or in chunks.
    ///
    /// Returns the completion response of the last request.
    pub async fn upload_file(&self, file: FileUpload) -> Result<UploadResponse> {
        self.policy.check(&file.file_name, file.data.len() as u64)?;

        if !self.policy.should_chunk(file.data.len() as u64) {
            return self.upload_direct(&file).await;
        }

        let plan = ChunkPlan::new(file.data.clone(), self.policy.chunk_size)?;
        self.upload_chunked(&file, &plan).await
    }

    /// Send every chunk of `plan` in order; returns the completion response
    pub async fn upload_chunked(&self, file: &FileUpload, plan: &ChunkPlan) -> Result<UploadResponse> {
        info!(
            file = %file.file_name,
            file_id = plan.file_id(),
            chunks = plan.total_chunks(),
            "Starting chunked upload"
        );

        let checksum = file.send_checksum.then(|| ContentHash::new(&file.data));

        for (index, data) in plan.chunks() {
            let response = self
                .submit_chunk(file, plan.file_id(), index, plan.total_chunks(), data, checksum.as_ref())
                .await?;

            if response.complete == Some(true) {
                return Ok(response);
            }
            debug!(index, progress = ?response.progress, "Chunk accepted");
        }

        Err(ClientError::InvalidResponse(format!(
            "all {} chunks sent but the upload never completed",
            plan.total_chunks()
        )))
    }

    /// Send one chunk as raw bytes with its fields in headers
    pub async fn submit_chunk(
        &self,
        file: &FileUpload,
        file_id: &str,
        index: u32,
        total_chunks: u32,
        data: Bytes,
        checksum: Option<&ContentHash>,
    ) -> Result<UploadResponse> {
        let mut request = self.file_request("/v1/chunks", file, data)?;
        let map = request.headers_mut();
        map.insert(headers::FILE_ID, header_value(file_id)?);
        map.insert(headers::CHUNK_INDEX, HeaderValue::from(index));
        map.insert(headers::TOTAL_CHUNKS, HeaderValue::from(total_chunks));
        if let Some(checksum) = checksum {
            map.insert(headers::CHECKSUM, header_value(&checksum.to_hex())?);
        }

        self.send_upload(request).await
    }

    /// Send a small file in one request
    pub async fn upload_direct(&self, file: &FileUpload) -> Result<UploadResponse> {
        let request = self.file_request("/v1/documents", file, file.data.clone())?;
        self.send_upload(request).await
    }

    /// Documents of an owner record, newest first
    pub async fn list_documents(&self, owner_record_id: &str) -> Result<Vec<PublishedDocument>> {
        let path = format!("/v1/owners/{}/documents", encode(owner_record_id));
        let body = self.send_expecting_success(Method::GET, &path).await?;

        serde_json::from_slice(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("document list: {}", e)))
    }

    pub async fn remove_document(&self, id: DocumentId) -> Result<()> {
        self.send_expecting_success(Method::DELETE, &format!("/v1/documents/{}", id))
            .await?;
        Ok(())
    }

    /// Remove every document of the owner in `folder`; returns how many went
    pub async fn remove_folder(&self, owner_record_id: &str, folder: &str) -> Result<u64> {
        let path = format!("/v1/owners/{}/folders/{}", encode(owner_record_id), encode(folder));
        let body = self.send_expecting_success(Method::DELETE, &path).await?;

        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        value["removed"]
            .as_u64()
            .ok_or_else(|| ClientError::InvalidResponse("missing removed count".to_string()))
    }

    /// Download a stored file by its public URL, through this connection
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let uri: Uri = url
            .parse()
            .map_err(|e| ClientError::Request(format!("Invalid URL {}: {}", url, e)))?;
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        self.send_expecting_success(Method::GET, path).await
    }

    fn file_request(&self, path: &str, file: &FileUpload, data: Bytes) -> Result<Request<Full<Bytes>>> {
        let mut request = self.request(Method::POST, path, Full::new(data))?;
        let map = request.headers_mut();

        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        map.insert(headers::FILE_NAME, header_value(&encode(&file.file_name))?);
        map.insert(headers::OWNER_RECORD_ID, header_value(&file.owner_record_id)?);
        if let Some(content_type) = &file.content_type {
            map.insert(headers::FILE_TYPE, header_value(content_type)?);
        }
        if let Some(folder) = &file.folder_name {
            map.insert(headers::FOLDER_NAME, header_value(&encode(folder))?);
        }

        Ok(request)
    }

    fn request(&self, method: Method, path: &str, body: Full<Bytes>) -> Result<Request<Full<Bytes>>> {
        Request::builder()
            .method(method)
            .uri(format!("{}{}", self.base_url, path))
            .body(body)
            .map_err(|e| ClientError::Request(e.to_string()))
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<(u16, Bytes)> {
        let mut sender = self.sender.clone();
        sender.ready().await?;

        let response: Response<Incoming> = sender.send_request(request).await?;
        let status = response.status().as_u16();
        let body = response.into_body().collect().await?.to_bytes();
        Ok((status, body))
    }

    async fn send_upload(&self, request: Request<Full<Bytes>>) -> Result<UploadResponse> {
        let (status, body) = self.send(request).await?;

        let response: UploadResponse = serde_json::from_slice(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("status {}: {}", status, e)))?;

        if !response.success {
            return Err(rejection(status, response));
        }
        Ok(response)
    }

    async fn send_expecting_success(&self, method: Method, path: &str) -> Result<Bytes> {
        let request = self.request(method, path, Full::new(Bytes::new()))?;
        let (status, body) = self.send(request).await?;

        if !(200..300).contains(&status) {
            return Err(match serde_json::from_slice::<UploadResponse>(&body) {
                Ok(response) => rejection(status, response),
                Err(_) => ClientError::InvalidResponse(format!("status {}", status)),
            });
        }
        Ok(body)
    }
}

fn rejection(status: u16, response: UploadResponse) -> ClientError {
    ClientError::Rejected {
        status,
        kind: response.kind.unwrap_or_else(|| "unknown_error".to_string()),
        message: response.error.unwrap_or_default(),
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ClientError::Request(format!("bad header value {:?}: {}", value, e)))
}
