use crate::codec::ReceivedFile;
use crate::store::{FileHandle, ObjectStore, StoreError};
use async_trait::async_trait;
use beam_core::PeerId;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads outgoing files from local paths and saves incoming ones under `root`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First free path for `name` inside the download directory.
    async fn target_path(&self, name: &str) -> PathBuf {
        let name = sanitize_file_name(name);
        let candidate = self.root.join(&name);
        if !path_exists(&candidate).await {
            return candidate;
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_owned(), format!(".{}", ext)),
            _ => (name.clone(), String::new()),
        };
        let mut n = 1;
        loop {
            let candidate = self.root.join(format!("{} ({}){}", stem, n, ext));
            if !path_exists(&candidate).await {
                return candidate;
            }
            n += 1;
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Strips any directory components a remote peer put into a file name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    let base: String = base.chars().filter(|c| !c.is_control()).collect();
    match base.as_str() {
        "" | "." | ".." => "received.bin".to_owned(),
        _ => base,
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn fetch(&self, file: &FileHandle) -> Result<Bytes, StoreError> {
        let data = tokio::fs::read(&file.location)
            .await
            .map_err(|source| StoreError::Io {
                path: file.location.clone(),
                source,
            })?;

        if data.len() as u64 != file.size {
            return Err(StoreError::SizeMismatch {
                location: file.location.clone(),
                expected: file.size,
                actual: data.len() as u64,
            });
        }
        Ok(Bytes::from(data))
    }

    async fn persist(&self, from: &PeerId, file: &ReceivedFile) -> Result<String, StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Io {
                path: self.root.display().to_string(),
                source,
            })?;

        let path = self.target_path(&file.header.name).await;
        tokio::fs::write(&path, &file.data)
            .await
            .map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;

        info!(
            "Saved {} ({} bytes) from {} to {}",
            file.header.name,
            file.data.len(),
            from,
            path.display()
        );
        Ok(path.display().to_string())
    }
}
