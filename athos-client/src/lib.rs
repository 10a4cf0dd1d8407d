//! SysAthos upload client SDK

pub mod chunked;
pub mod client;
pub mod error;
pub mod policy;

pub use chunked::ChunkPlan;
pub use client::{Client, FileUpload};
pub use error::ClientError;
pub use policy::UploadPolicy;

pub type Result<T> = std::result::Result<T, ClientError>;
