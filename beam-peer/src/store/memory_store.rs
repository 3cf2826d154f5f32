use crate::codec::ReceivedFile;
use crate::store::{FileHandle, ObjectStore, StoreError};
use async_trait::async_trait;
use beam_core::PeerId;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Keeps objects in memory. Useful for embedding and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<DashMap<String, Bytes>>,
    received: Arc<Mutex<Vec<(PeerId, ReceivedFile)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `name` and returns a handle for sending it.
    pub fn put(&self, name: &str, data: impl Into<Bytes>) -> FileHandle {
        let data = data.into();
        let location = format!("mem://{}", name);
        let handle = FileHandle::new(name, data.len() as u64, location.clone());
        self.objects.insert(location, data);
        handle
    }

    pub async fn received(&self) -> Vec<(PeerId, ReceivedFile)> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(&self, file: &FileHandle) -> Result<Bytes, StoreError> {
        self.objects
            .get(&file.location)
            .map(|o| o.value().clone())
            .ok_or_else(|| StoreError::NotFound(file.location.clone()))
    }

    async fn persist(&self, from: &PeerId, file: &ReceivedFile) -> Result<String, StoreError> {
        let mut received = self.received.lock().await;
        received.push((from.clone(), file.clone()));
        Ok(format!("mem://received/{}/{}", received.len(), file.header.name))
    }
}
