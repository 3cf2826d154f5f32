use crate::codec::ReceivedFile;
use async_trait::async_trait;
use beam_core::{FileHeader, PeerId};
use bytes::Bytes;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object {location} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        location: String,
        expected: u64,
        actual: u64,
    },
}

/// A file the local user wants to send, resolvable through an [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Where the store finds the bytes (path, URL, key).
    pub location: String,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, size: u64, location: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            mime_type: guess_mime_type(&name).to_owned(),
            name,
            size,
            location: location.into(),
        }
    }

    /// Builds a handle from a file on local disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await.map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        Ok(Self::new(name, meta.len(), path.display().to_string()))
    }

    pub fn header(&self) -> FileHeader {
        FileHeader::new(self.name.clone(), self.size, self.mime_type.clone())
    }
}

/// Durable object store boundary: bytes in before sending, bytes out after receiving.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, file: &FileHandle) -> Result<Bytes, StoreError>;

    /// Saves a completed transfer and returns where it ended up.
    async fn persist(&self, from: &PeerId, file: &ReceivedFile) -> Result<String, StoreError>;
}

pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "log" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}
