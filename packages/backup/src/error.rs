use common::EngineType;
use common::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported backup location '{0}': expected an http(s):// URL or s3://bucket/key")]
    InvalidLocation(String),

    #[error("backup download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backup download of {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("unsupported backup format '{file}' for {engine}")]
    UnsupportedFormat { file: String, engine: EngineType },

    #[error("I/O error while staging backup: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a password is required unless IAM authentication is enabled")]
    MissingPassword,

    #[error(
        "failed to generate an IAM auth token for {host}: {reason}. \
         Check that the AWS API endpoints are reachable from this host, \
         that the caller is allowed rds-db:connect on the database user, \
         and that TLS trust roots are installed"
    )]
    Token { host: String, reason: String },

    #[error(
        "cannot reach database at {host}:{port}: {reason}. \
         Check that the VPC routes traffic from this host to the database, \
         that security groups or firewall rules allow inbound connections on port {port}, \
         that the credentials and database name are correct, \
         and that the hostname resolves in DNS"
    )]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("{program} was not found on PATH; install the {engine} client tools")]
    ToolMissing { program: String, engine: EngineType },

    #[error("{program} exited with {status}: {stderr}")]
    DumpFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error during backup: {0}")]
    Io(#[from] std::io::Error),
}
