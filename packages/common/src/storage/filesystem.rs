use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::error::StorageError;
use super::object_ref::ObjectRef;
use super::traits::{ObjectMeta, ObjectStore};

/// Filesystem-backed object store for local development and tests.
///
/// Objects are stored at `{base_path}/{bucket}/{key}`. Writes go through
/// `{base_path}/.tmp` and are renamed into place, so readers never observe
/// a partially written object.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
}

impl FilesystemObjectStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self { base_path })
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    fn object_path(&self, object: &ObjectRef) -> PathBuf {
        self.bucket_path(object.bucket()).join(object.key())
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Copy `src` to `dest` via a sibling temp file.
    async fn copy_atomically(src: &Path, dest: &Path, temp: &Path) -> Result<u64, StorageError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let written = match fs::copy(src, temp).await {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(temp).await;
                return Err(e.into());
            }
        };
        if let Err(e) = fs::rename(temp, dest).await {
            let _ = fs::remove_file(temp).await;
            return Err(e.into());
        }
        Ok(written)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        fs::create_dir_all(self.bucket_path(bucket)).await?;
        Ok(())
    }

    async fn put_file(
        &self,
        object: &ObjectRef,
        path: &Path,
        _content_type: &str,
    ) -> Result<u64, StorageError> {
        if !fs::try_exists(self.bucket_path(object.bucket())).await? {
            return Err(StorageError::NotFound(format!("bucket {}", object.bucket())));
        }
        Self::copy_atomically(path, &self.object_path(object), &self.temp_path()).await
    }

    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectMeta>, StorageError> {
        match fs::metadata(self.object_path(object)).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectMeta {
                size: meta.len(),
                content_type: None,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_to_file(&self, object: &ObjectRef, dest: &Path) -> Result<u64, StorageError> {
        let src = self.object_path(object);
        if !fs::try_exists(&src).await? {
            return Err(StorageError::NotFound(object.to_string()));
        }
        let temp = dest.with_extension(format!("partial-{}", uuid::Uuid::new_v4()));
        Self::copy_atomically(&src, dest, &temp).await
    }
}
