pub mod capture;
pub mod config;
pub mod error;
pub mod import;
pub mod restore;

pub use capture::{
    BackupArtifact, BackupCapture, CaptureRequest, ConnectionDescriptor, DumpRunner,
    ProcessDumpRunner, RdsTokenProvider, TokenProvider,
};
pub use error::{CaptureError, ImportError};
pub use import::{BackupImporter, BackupSource, validate_url};
pub use restore::{DumpFormat, restorable_format};
