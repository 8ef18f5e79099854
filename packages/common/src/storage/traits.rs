use std::path::Path;

use async_trait::async_trait;

use super::error::StorageError;
use super::object_ref::ObjectRef;

/// Metadata returned by a head request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
}

/// Bucketed object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket if it does not exist yet.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Upload a local file, streaming its contents. Returns the uploaded size.
    async fn put_file(
        &self,
        object: &ObjectRef,
        path: &Path,
        content_type: &str,
    ) -> Result<u64, StorageError>;

    /// Fetch object metadata, or `None` if the object does not exist.
    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectMeta>, StorageError>;

    /// Download an object into `dest`. Returns the number of bytes written.
    ///
    /// Implementations must not leave a partial file at `dest` on failure.
    async fn get_to_file(&self, object: &ObjectRef, dest: &Path) -> Result<u64, StorageError>;

    /// Check whether an object exists.
    async fn exists(&self, object: &ObjectRef) -> Result<bool, StorageError> {
        Ok(self.head(object).await?.is_some())
    }
}
