//! Client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The file was refused before any request was sent
    #[error("File not accepted: {0}")]
    Policy(String),

    /// The server answered with `success: false`
    #[error("Upload rejected ({status}, {kind}): {message}")]
    Rejected {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("Core error: {0}")]
    Core(#[from] athos_core::AthosError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
}

impl ClientError {
    /// Server-side error kind, when the server rejected the request
    pub fn kind(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// True when the file is stored but not linked to its record
    pub fn is_orphaned_upload(&self) -> bool {
        self.kind() == Some("record_error")
    }
}
