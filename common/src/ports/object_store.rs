//! Object Store Port (A5): binary-file storage for uploaded documents.
//! Parsing PDF/DOCX to text is out of scope here; this only moves bytes.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{local::LocalFileSystem, memory::InMemory, path::Path as ObjectPath, ObjectStore as ObjectStoreCrate};

use crate::error::AppError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Bytes, mime: &str) -> Result<(), AppError>;
    async fn download(&self, key: &str) -> Result<Bytes, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

fn map_err(err: object_store::Error) -> AppError {
    match &err {
        object_store::Error::NotFound { .. } => AppError::NotFound(err.to_string()),
        object_store::Error::NotSupported { .. } | object_store::Error::Generic { .. } => {
            AppError::ServiceUnavailable(err.to_string())
        }
        _ => AppError::ObjectStore(err),
    }
}

/// Local-filesystem backend for production, wrapped behind the
/// `ObjectStore` trait the way the teacher's `StorageManager` wraps
/// backends behind a `StorageKind` enum.
pub struct LocalObjectStore {
    inner: LocalFileSystem,
}

impl LocalObjectStore {
    pub fn new(data_dir: &str) -> Result<Self, AppError> {
        std::fs::create_dir_all(data_dir)?;
        let inner = LocalFileSystem::new_with_prefix(data_dir)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, key: &str, bytes: Bytes, _mime: &str) -> Result<(), AppError> {
        let path = ObjectPath::from(key);
        self.inner
            .put(&path, bytes.into())
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes, AppError> {
        let path = ObjectPath::from(key);
        let result = self.inner.get(&path).await.map_err(map_err)?;
        result.bytes().await.map_err(map_err)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = ObjectPath::from(key);
        self.inner.delete(&path).await.map_err(map_err)
    }
}

/// In-memory fake (A9) for tests.
pub struct InMemoryObjectStore {
    inner: InMemory,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            inner: InMemory::new(),
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, key: &str, bytes: Bytes, _mime: &str) -> Result<(), AppError> {
        let path = ObjectPath::from(key);
        self.inner.put(&path, bytes.into()).await.map_err(map_err)?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes, AppError> {
        let path = ObjectPath::from(key);
        let result = self.inner.get(&path).await.map_err(map_err)?;
        result.bytes().await.map_err(map_err)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = ObjectPath::from(key);
        self.inner.delete(&path).await.map_err(map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_bytes() {
        let store = InMemoryObjectStore::new();
        store
            .upload("docs/a.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        let bytes = store.download("docs/a.txt").await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"hello"));
        store.delete("docs/a.txt").await.unwrap();
        assert!(store.download("docs/a.txt").await.is_err());
    }
}
