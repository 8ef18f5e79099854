use std::path::Path;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, BucketConfiguration, Region};
use tokio::fs;
use tracing::{debug, info};

use super::error::StorageError;
use super::object_ref::ObjectRef;
use super::traits::{ObjectMeta, ObjectStore};
use crate::config::StorageConfig;

/// S3-compatible object store.
///
/// Bucket handles are cheap request builders, so one is created per call;
/// this lets a single store serve backup references from any bucket the
/// credentials can reach.
pub struct S3ObjectStore {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3ObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| StorageError::Backend(format!("invalid region: {e}")))?,
        };

        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => {
                Credentials::new(Some(access), Some(secret), None, None, None)
            }
            _ => Credentials::default(),
        }
        .map_err(|e| StorageError::Backend(format!("failed to load credentials: {e}")))?;

        Ok(Self {
            region,
            credentials,
            path_style: config.path_style,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(backend_error)?;
        Ok(if self.path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

fn backend_error(err: S3Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        if self.bucket(bucket)?.exists().await.map_err(backend_error)? {
            return Ok(());
        }

        let response = if self.path_style {
            Bucket::create_with_path_style(
                bucket,
                self.region.clone(),
                self.credentials.clone(),
                BucketConfiguration::default(),
            )
            .await
        } else {
            Bucket::create(
                bucket,
                self.region.clone(),
                self.credentials.clone(),
                BucketConfiguration::default(),
            )
            .await
        }
        .map_err(backend_error)?;

        // 409 means another writer created it between the check and the create.
        if !response.success() && response.response_code != 409 {
            return Err(StorageError::Backend(format!(
                "failed to create bucket {bucket}: HTTP {} {}",
                response.response_code, response.response_text
            )));
        }
        info!(bucket, "Created bucket");
        Ok(())
    }

    async fn put_file(
        &self,
        object: &ObjectRef,
        path: &Path,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let size = fs::metadata(path).await?.len();
        let mut file = fs::File::open(path).await?;

        let response = self
            .bucket(object.bucket())?
            .put_object_stream_with_content_type(&mut file, object.key(), content_type)
            .await
            .map_err(backend_error)?;

        if !is_success(response.status_code()) {
            return Err(StorageError::Backend(format!(
                "upload of {object} failed with HTTP {}",
                response.status_code()
            )));
        }
        debug!(%object, size, "Uploaded object");
        Ok(size)
    }

    async fn head(&self, object: &ObjectRef) -> Result<Option<ObjectMeta>, StorageError> {
        match self.bucket(object.bucket())?.head_object(object.key()).await {
            Ok((_, 404)) => Ok(None),
            Ok((head, status)) if is_success(status) => Ok(Some(ObjectMeta {
                size: head.content_length.unwrap_or_default().max(0) as u64,
                content_type: head.content_type,
            })),
            Ok((_, status)) => Err(StorageError::Backend(format!(
                "head {object} failed with HTTP {status}"
            ))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn get_to_file(&self, object: &ObjectRef, dest: &Path) -> Result<u64, StorageError> {
        let temp = dest.with_extension(format!("partial-{}", uuid::Uuid::new_v4()));
        let bucket = self.bucket(object.bucket())?;

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            let status = bucket
                .get_object_to_writer(object.key(), &mut file)
                .await
                .map_err(|e| match e {
                    S3Error::HttpFailWithBody(404, _) => StorageError::NotFound(object.to_string()),
                    other => backend_error(other),
                })?;
            tokio::io::AsyncWriteExt::flush(&mut file).await?;
            match status {
                404 => Err(StorageError::NotFound(object.to_string())),
                s if is_success(s) => Ok(()),
                s => Err(StorageError::Backend(format!(
                    "download of {object} failed with HTTP {s}"
                ))),
            }
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp, dest).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(fs::metadata(dest).await?.len())
    }
}
