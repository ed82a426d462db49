//! Blob storage capability: containers of named byte objects.

pub mod azure;
pub mod local;

pub use azure::AzureBlobStore;
pub use local::LocalBlobStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Storage returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Blob '{name}' not found in container '{container}'")]
    NotFound { container: String, name: String },

    #[error("Blob '{name}' already exists in container '{container}'")]
    AlreadyExists { container: String, name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob listing: {0}")]
    InvalidListing(String),
}

pub trait BlobStore: Send + Sync {
    /// Names of all blobs in `container`, in listing order.
    fn list(&self, container: &str) -> Result<Vec<String>, StorageError>;

    /// Address of a blob, safe to log and record.
    fn url(&self, container: &str, name: &str) -> String;

    /// Address handed to the analysis service. May carry credentials.
    fn access_url(&self, container: &str, name: &str) -> String {
        self.url(container, name)
    }

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Upload `bytes`. With `overwrite == false` an existing blob is an error.
    fn put(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<(), StorageError>;

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError>;
}

/// Content type to upload a blob with, from its name.
pub fn content_type_for(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".tif") || lower.ends_with(".tiff") {
        "image/tiff"
    } else {
        "application/octet-stream"
    }
}
