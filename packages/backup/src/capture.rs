//! Backup Capture Pipeline: dump a live database with the engine's native
//! utility and upload the result to object storage.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::EngineType;
use common::storage::{ObjectRef, ObjectStore, backup_timestamp};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::CaptureError;

#[derive(Clone)]
pub enum DbAuth {
    Password(String),
    /// Short-lived token from the managed-database identity provider.
    Iam,
}

impl fmt::Debug for DbAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::Iam => f.write_str("Iam"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: DbAuth,
    pub database: String,
    /// Address dialled instead of `host`. Tokens are still issued for `host`.
    pub endpoint_override: Option<String>,
}

impl ConnectionDescriptor {
    /// Build a descriptor from request-style inputs.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: Option<String>,
        use_iam_auth: bool,
        database: impl Into<String>,
        endpoint_override: Option<String>,
    ) -> Result<Self, CaptureError> {
        let auth = if use_iam_auth {
            DbAuth::Iam
        } else {
            DbAuth::Password(password.filter(|p| !p.is_empty()).ok_or(CaptureError::MissingPassword)?)
        };
        Ok(Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            database: database.into(),
            endpoint_override: endpoint_override.filter(|e| !e.is_empty()),
        })
    }

    pub fn connect_host(&self) -> &str {
        self.endpoint_override.as_deref().unwrap_or(&self.host)
    }

    pub fn uses_iam(&self) -> bool {
        matches!(self.auth, DbAuth::Iam)
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.username,
            self.connect_host(),
            self.port,
            self.database
        )
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, host: &str, port: u16, username: &str) -> Result<String, CaptureError>;
}

/// IAM auth tokens for RDS, signed with the default AWS credential chain.
pub struct RdsTokenProvider {
    region: Option<String>,
}

impl RdsTokenProvider {
    pub fn new(region: Option<String>) -> Self {
        Self { region }
    }
}

#[async_trait]
impl TokenProvider for RdsTokenProvider {
    async fn token(&self, host: &str, port: u16, username: &str) -> Result<String, CaptureError> {
        use aws_sdk_rds::auth_token::{AuthTokenGenerator, Config};

        let token_error = |reason: String| CaptureError::Token {
            host: host.to_string(),
            reason,
        };

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let generator = AuthTokenGenerator::new(
            Config::builder()
                .hostname(host)
                .port(u64::from(port))
                .username(username)
                .build()
                .map_err(|e| token_error(e.to_string()))?,
        );
        let token = generator
            .auth_token(&sdk_config)
            .await
            .map_err(|e| token_error(e.to_string()))?;
        Ok(token.as_str().to_string())
    }
}

/// A fully resolved dump invocation.
#[derive(Clone)]
pub struct DumpCommand {
    pub engine: EngineType,
    pub program: String,
    pub args: Vec<String>,
    /// Secrets travel through the environment, never the argument list.
    pub env: Vec<(String, String)>,
    pub output: PathBuf,
}

impl DumpCommand {
    /// Build the dump invocation with SSL required.
    pub fn build(
        engine: EngineType,
        conn: &ConnectionDescriptor,
        secret: &str,
        output: &Path,
    ) -> Self {
        let host = conn.connect_host().to_string();
        let port = conn.port.to_string();
        let out = output.display().to_string();

        let (args, env) = match engine {
            EngineType::Postgres => (
                vec![
                    "-h".into(),
                    host,
                    "-p".into(),
                    port,
                    "-U".into(),
                    conn.username.clone(),
                    "-d".into(),
                    conn.database.clone(),
                    "-F".into(),
                    "c".into(),
                    "--no-owner".into(),
                    "-f".into(),
                    out,
                ],
                vec![
                    ("PGPASSWORD".to_string(), secret.to_string()),
                    ("PGSSLMODE".to_string(), "require".to_string()),
                ],
            ),
            EngineType::Mysql => {
                let mut args = vec![
                    "-h".into(),
                    host,
                    "-P".into(),
                    port,
                    "-u".into(),
                    conn.username.clone(),
                    "--ssl-mode=REQUIRED".into(),
                    "--single-transaction".into(),
                    "--routines".into(),
                    "--triggers".into(),
                    format!("--result-file={out}"),
                ];
                if conn.uses_iam() {
                    args.push("--enable-cleartext-plugin".into());
                }
                args.push(conn.database.clone());
                (args, vec![("MYSQL_PWD".to_string(), secret.to_string())])
            }
        };

        Self {
            engine,
            program: engine.dump_program().to_string(),
            args,
            env,
            output: output.to_path_buf(),
        }
    }
}

impl fmt::Debug for DumpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait DumpRunner: Send + Sync {
    async fn run(&self, command: &DumpCommand) -> Result<(), CaptureError>;
}

/// Runs dump utilities as child processes.
pub struct ProcessDumpRunner;

#[async_trait]
impl DumpRunner for ProcessDumpRunner {
    async fn run(&self, command: &DumpCommand) -> Result<(), CaptureError> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CaptureError::ToolMissing {
                    program: command.program.clone(),
                    engine: command.engine,
                },
                _ => CaptureError::Io(e),
            })?;

        if !output.status.success() {
            return Err(CaptureError::DumpFailed {
                program: command.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Deletes a staged dump when dropped.
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged dump"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staged dump"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub owner: String,
    pub project_id: String,
    pub engine: EngineType,
    pub connection: ConnectionDescriptor,
}

/// An uploaded dump.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    /// Redacted `user@host:port/db` of the source.
    pub source: String,
    pub object: ObjectRef,
    pub content_type: String,
    pub size_bytes: u64,
}

/// TCP connectivity probe, bounded by `timeout`.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> Result<(), CaptureError> {
    let unreachable = |reason: String| CaptureError::Unreachable {
        host: host.to_string(),
        port,
        reason,
    };
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(unreachable(e.to_string())),
        Err(_) => Err(unreachable(format!(
            "connection timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

pub struct BackupCapture {
    store: Arc<dyn ObjectStore>,
    tokens: Arc<dyn TokenProvider>,
    runner: Arc<dyn DumpRunner>,
    bucket: String,
    staging_dir: PathBuf,
    probe_timeout: Duration,
}

impl BackupCapture {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        tokens: Arc<dyn TokenProvider>,
        runner: Arc<dyn DumpRunner>,
        bucket: impl Into<String>,
        staging_dir: PathBuf,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            runner,
            bucket: bucket.into(),
            staging_dir,
            probe_timeout,
        }
    }

    async fn resolve_secret(&self, conn: &ConnectionDescriptor) -> Result<String, CaptureError> {
        match &conn.auth {
            DbAuth::Password(password) => Ok(password.clone()),
            DbAuth::Iam => self.tokens.token(&conn.host, conn.port, &conn.username).await,
        }
    }

    /// Run the pipeline: credential, probe, dump, upload. The staged dump is
    /// removed on every path.
    #[instrument(skip(self, request), fields(project_id = %request.project_id, source = %request.connection))]
    pub async fn run(&self, request: &CaptureRequest) -> Result<BackupArtifact, CaptureError> {
        let conn = &request.connection;
        let secret = self.resolve_secret(conn).await?;

        probe(conn.connect_host(), conn.port, self.probe_timeout).await?;

        let now = Utc::now();
        let ext = request.engine.dump_extension();
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let staged = StagedFile::new(self.staging_dir.join(format!(
            "{}-{}-{}.{ext}",
            request.project_id,
            backup_timestamp(now),
            uuid::Uuid::new_v4().simple()
        )));

        let command = DumpCommand::build(request.engine, conn, &secret, staged.path());
        debug!(?command, "Running dump");
        self.runner.run(&command).await?;

        let object = ObjectRef::new(
            self.bucket.clone(),
            ObjectRef::backup_key(&request.owner, &request.project_id, now, ext),
        )?;
        let content_type = request.engine.dump_content_type();
        self.store.ensure_bucket(object.bucket()).await?;
        let size_bytes = self
            .store
            .put_file(&object, staged.path(), content_type)
            .await?;

        info!(%object, size_bytes, "Backup uploaded");
        Ok(BackupArtifact {
            source: conn.to_string(),
            object,
            content_type: content_type.to_string(),
            size_bytes,
        })
    }
}
