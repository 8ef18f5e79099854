mod error;
mod object_ref;
mod traits;

pub mod filesystem;
#[cfg(feature = "object-storage")]
pub mod s3;

use std::path::PathBuf;
use std::sync::Arc;

pub use error::StorageError;
pub use object_ref::{ObjectRef, SCHEME, backup_timestamp};
pub use traits::{ObjectMeta, ObjectStore};

use crate::config::{StorageBackend, StorageConfig};

/// Build the object store selected by configuration.
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match config.backend {
        #[cfg(feature = "object-storage")]
        StorageBackend::S3 => Ok(Arc::new(s3::S3ObjectStore::new(config)?)),
        #[cfg(not(feature = "object-storage"))]
        StorageBackend::S3 => Err(StorageError::Backend(
            "built without the object-storage feature".into(),
        )),
        StorageBackend::Filesystem => Ok(Arc::new(
            filesystem::FilesystemObjectStore::new(PathBuf::from(&config.base_path)).await?,
        )),
    }
}
