use serde::Deserialize;

/// Object storage backend selector.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Filesystem,
}

/// App-level object storage configuration, shared by the server and the
/// backup binary.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Default: "s3".
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Bucket backups are uploaded to. Default: "devdb-backups".
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Default: "us-east-1".
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3-compatible endpoint (e.g. MinIO). Uses AWS when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static credentials. Falls back to the environment/profile chain when unset.
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Use path-style addressing. Required by most self-hosted endpoints.
    #[serde(default)]
    pub path_style: bool,
    /// Root directory of the filesystem backend. Default: "./data/objects".
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::S3
}
fn default_bucket() -> String {
    "devdb-backups".into()
}
fn default_region() -> String {
    "us-east-1".into()
}
fn default_base_path() -> String {
    "./data/objects".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            bucket: default_bucket(),
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
            base_path: default_base_path(),
        }
    }
}
