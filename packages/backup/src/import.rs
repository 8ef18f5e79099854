//! Backup Importer: validates external backup references and stages the
//! artifacts they point to on local disk.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use common::storage::{ObjectRef, ObjectStore, SCHEME};
use futures::TryStreamExt;
use reqwest::Url;
use tokio::fs;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument, warn};

use crate::error::ImportError;

/// A parsed backup reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupSource {
    Http(Url),
    Object(ObjectRef),
}

impl BackupSource {
    /// Parse a backup location. Only `http`, `https` and `s3` are accepted.
    pub fn parse(location: &str) -> Result<Self, ImportError> {
        let invalid = || ImportError::InvalidLocation(location.to_string());

        if location.starts_with(SCHEME) {
            return ObjectRef::parse(location)
                .map(Self::Object)
                .map_err(|_| invalid());
        }

        let url = Url::parse(location).map_err(|_| invalid())?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => {
                Ok(Self::Http(url))
            }
            _ => Err(invalid()),
        }
    }

    /// Name of the artifact file, taken from the last path segment.
    pub fn file_name(&self) -> String {
        let name = match self {
            Self::Http(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default(),
            Self::Object(object) => object.file_name(),
        };
        if name.is_empty() || name == ".." {
            "backup".to_string()
        } else {
            name.to_string()
        }
    }
}

impl std::fmt::Display for BackupSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(url) => write!(f, "{url}"),
            Self::Object(object) => write!(f, "{object}"),
        }
    }
}

/// Whether `location` is an acceptable backup reference.
pub fn validate_url(location: &str) -> bool {
    BackupSource::parse(location).is_ok()
}

pub struct BackupImporter {
    http: reqwest::Client,
    store: Arc<dyn ObjectStore>,
    probe_timeout: Duration,
}

impl BackupImporter {
    /// `timeout` bounds the whole reachability probe, and each connect and
    /// read during a download.
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Result<Self, ImportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            store,
            probe_timeout: timeout,
        })
    }

    /// HEAD-probe a backup reference. Any error, or no answer within the
    /// probe timeout, counts as unreachable.
    #[instrument(skip(self))]
    pub async fn verify_reachable(&self, location: &str) -> bool {
        let source = match BackupSource::parse(location) {
            Ok(source) => source,
            Err(e) => {
                debug!(error = %e, "Backup location rejected");
                return false;
            }
        };

        match tokio::time::timeout(self.probe_timeout, self.probe(source)).await {
            Ok(reachable) => reachable,
            Err(_) => {
                warn!(timeout = ?self.probe_timeout, "Backup probe timed out");
                false
            }
        }
    }

    async fn probe(&self, source: BackupSource) -> bool {
        match source {
            BackupSource::Http(url) => match self.http.head(url).send().await {
                Ok(response) => {
                    let ok = response.status().is_success();
                    if !ok {
                        debug!(status = %response.status(), "Backup HEAD probe failed");
                    }
                    ok
                }
                Err(e) => {
                    debug!(error = %e, "Backup HEAD probe failed");
                    false
                }
            },
            BackupSource::Object(object) => match self.store.exists(&object).await {
                Ok(exists) => exists,
                Err(e) => {
                    debug!(error = %e, "Backup object head failed");
                    false
                }
            },
        }
    }

    /// Download the artifact into `dest_dir`.
    ///
    /// Returns `None` when the object is missing or the transfer fails; no
    /// partial file is left behind in either case.
    #[instrument(skip(self, dest_dir), fields(source = %source))]
    pub async fn stage(&self, source: &BackupSource, dest_dir: &Path) -> Option<PathBuf> {
        match self.try_stage(source, dest_dir).await {
            Ok(path) => {
                info!(path = %path.display(), "Staged backup artifact");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "Failed to stage backup artifact");
                None
            }
        }
    }

    pub async fn try_stage(
        &self,
        source: &BackupSource,
        dest_dir: &Path,
    ) -> Result<PathBuf, ImportError> {
        fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(source.file_name());

        match source {
            BackupSource::Object(object) => {
                self.store.get_to_file(object, &dest).await?;
            }
            BackupSource::Http(url) => {
                self.download(url, &dest).await?;
            }
        }
        Ok(dest)
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, ImportError> {
        let response = self.http.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ImportError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let temp = dest.with_extension(format!("partial-{}", uuid::Uuid::new_v4()));
        let result = async {
            let mut file = fs::File::create(&temp).await?;
            let mut reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
            let written = tokio::io::copy(&mut reader, &mut file).await?;
            tokio::io::AsyncWriteExt::flush(&mut file).await?;
            fs::rename(&temp, dest).await?;
            Ok::<_, io::Error>(written)
        }
        .await;

        match result {
            Ok(written) => Ok(written),
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::filesystem::FilesystemObjectStore;

    async fn importer(dir: &Path) -> (BackupImporter, Arc<dyn ObjectStore>) {
        let store: Arc<dyn ObjectStore> = Arc::new(
            FilesystemObjectStore::new(dir.join("objects"))
                .await
                .unwrap(),
        );
        let importer = BackupImporter::new(store.clone(), Duration::from_secs(2)).unwrap();
        (importer, store)
    }

    #[test]
    fn validate_url_accepts_http_and_object_refs() {
        assert!(validate_url("https://backups.example.com/db.dump"));
        assert!(validate_url("http://10.0.0.5:8080/dumps/latest.sql"));
        assert!(validate_url("s3://devdb-backups/acme/acme-shop/x.dump"));
    }

    #[test]
    fn validate_url_rejects_everything_else() {
        assert!(!validate_url("not-a-url"));
        assert!(!validate_url("ftp://host/path"));
        assert!(!validate_url("file:///etc/passwd"));
        assert!(!validate_url("s3://bucket-only"));
        assert!(!validate_url(""));
    }

    #[test]
    fn file_name_falls_back_for_bare_urls() {
        let source = BackupSource::parse("https://backups.example.com/").unwrap();
        assert_eq!(source.file_name(), "backup");
        let source = BackupSource::parse("https://backups.example.com/a/db.dump?sig=1").unwrap();
        assert_eq!(source.file_name(), "db.dump");
    }

    #[tokio::test]
    async fn verify_reachable_checks_object_existence() {
        let dir = tempfile::tempdir().unwrap();
        let (importer, store) = importer(dir.path()).await;
        store.ensure_bucket("backups").await.unwrap();

        let src = dir.path().join("db.dump");
        std::fs::write(&src, b"PGDMP").unwrap();
        let object = ObjectRef::new("backups", "acme/db.dump").unwrap();
        store.put_file(&object, &src, "application/octet-stream").await.unwrap();

        assert!(importer.verify_reachable("s3://backups/acme/db.dump").await);
        assert!(!importer.verify_reachable("s3://backups/acme/missing.dump").await);
        assert!(!importer.verify_reachable("ftp://host/path").await);
    }

    #[tokio::test]
    async fn verify_reachable_is_false_for_unreachable_host() {
        let dir = tempfile::tempdir().unwrap();
        let (importer, _store) = importer(dir.path()).await;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(
            !importer
                .verify_reachable(&format!("http://127.0.0.1:{port}/db.dump"))
                .await
        );
    }

    #[tokio::test]
    async fn verify_reachable_gives_up_on_a_silent_host() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> =
            Arc::new(FilesystemObjectStore::new(dir.path().join("objects")).await.unwrap());
        let importer = BackupImporter::new(store, Duration::from_millis(200)).unwrap();

        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let reachable = tokio::time::timeout(
            Duration::from_secs(5),
            importer.verify_reachable(&format!("http://127.0.0.1:{port}/db.dump")),
        )
        .await
        .expect("probe did not honour its timeout");
        assert!(!reachable);
    }

    #[tokio::test]
    async fn stage_downloads_object() {
        let dir = tempfile::tempdir().unwrap();
        let (importer, store) = importer(dir.path()).await;
        store.ensure_bucket("backups").await.unwrap();

        let src = dir.path().join("db.sql");
        std::fs::write(&src, b"CREATE TABLE t (id int);").unwrap();
        let object = ObjectRef::new("backups", "acme/db.sql").unwrap();
        store.put_file(&object, &src, "application/sql").await.unwrap();

        let staging = dir.path().join("staging");
        let staged = importer
            .stage(&BackupSource::Object(object), &staging)
            .await
            .unwrap();

        assert_eq!(staged, staging.join("db.sql"));
        assert_eq!(std::fs::read(&staged).unwrap(), b"CREATE TABLE t (id int);");
    }

    #[tokio::test]
    async fn stage_missing_object_returns_none_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (importer, store) = importer(dir.path()).await;
        store.ensure_bucket("backups").await.unwrap();

        let staging = dir.path().join("staging");
        let source = BackupSource::parse("s3://backups/acme/missing.dump").unwrap();

        assert!(importer.stage(&source, &staging).await.is_none());
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }
}
